use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{req_i64_range, req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

fn schedule_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    require_row(conn, "classes", &class_id, "class")?;

    let mut stmt = conn
        .prepare(
            "SELECT day, period, course_id, course_subject
             FROM schedule_slots
             WHERE class_id = ?
             ORDER BY day, period",
        )
        .map_err(HandlerErr::db_query)?;
    let slots = stmt
        .query_map([&class_id], |row| {
            let day: i64 = row.get(0)?;
            let period: String = row.get(1)?;
            let course_id: String = row.get(2)?;
            let course_subject: String = row.get(3)?;
            Ok(json!({
                "day": day,
                "period": period,
                "courseId": course_id,
                "courseSubject": course_subject
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "slots": slots }))
}

fn schedule_assign(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    require_row(conn, "classes", &class_id, "class")?;
    let day = req_i64_range(params, "day", 1, 5)?;
    let period = req_text(params, "period")?;
    let course_id = req_str(params, "courseId")?;

    // The course must belong to the class whose grid is being edited.
    let course_subject: Option<String> = conn
        .query_row(
            "SELECT subject FROM courses WHERE id = ? AND class_id = ?",
            (&course_id, &class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(course_subject) = course_subject else {
        return Err(HandlerErr::not_found("course not found in this class"));
    };

    // One course per (class, day, period) cell. A taken cell is a user
    // mistake, not a constraint violation to bubble up from the store.
    let occupied: Option<String> = conn
        .query_row(
            "SELECT course_subject FROM schedule_slots
             WHERE class_id = ? AND day = ? AND period = ?",
            (&class_id, day, &period),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    if let Some(existing) = occupied {
        return Err(HandlerErr {
            code: "bad_params".to_string(),
            message: "slot already occupied".to_string(),
            details: Some(json!({ "day": day, "period": period, "courseSubject": existing })),
        });
    }

    conn.execute(
        "INSERT INTO schedule_slots(class_id, day, period, course_id, course_subject)
         VALUES(?, ?, ?, ?, ?)",
        (&class_id, day, &period, &course_id, &course_subject),
    )
    .map_err(|e| HandlerErr::db_insert(e, "schedule_slots"))?;

    Ok(json!({
        "day": day,
        "period": period,
        "courseId": course_id,
        "courseSubject": course_subject
    }))
}

fn schedule_clear(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    let day = req_i64_range(params, "day", 1, 5)?;
    let period = req_text(params, "period")?;

    let removed = conn
        .execute(
            "DELETE FROM schedule_slots WHERE class_id = ? AND day = ? AND period = ?",
            (&class_id, day, &period),
        )
        .map_err(|e| HandlerErr::db_delete(e, "schedule_slots"))?;

    Ok(json!({ "cleared": removed > 0 }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "schedule.list" => Some(run(schedule_list(state, &req.params))),
        "schedule.assign" => Some(run(schedule_assign(state, &req.params))),
        "schedule.clear" => Some(run(schedule_clear(state, &req.params))),
        _ => None,
    }
}
