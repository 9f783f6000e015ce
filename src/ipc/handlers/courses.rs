use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_f64, opt_text, req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn teacher_display_name(conn: &Connection, teacher_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT last_name, first_name FROM teachers WHERE id = ?",
        [teacher_id],
        |r| {
            let last: String = r.get(0)?;
            let first: String = r.get(1)?;
            Ok(format!("{}, {}", last, first))
        },
    )
    .optional()
    .map_err(HandlerErr::db_query)?
    .ok_or_else(|| HandlerErr::not_found("teacher not found"))
}

fn courses_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "courses": [] }));
    };

    let class_filter = opt_text(params, "classId");
    let sql = match class_filter {
        Some(_) => {
            "SELECT id, class_id, teacher_id, subject, weekly_hours, teacher_name
             FROM courses WHERE class_id = ? ORDER BY subject"
        }
        None => {
            "SELECT id, class_id, teacher_id, subject, weekly_hours, teacher_name
             FROM courses ORDER BY subject"
        }
    };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db_query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<Value> {
        let id: String = row.get(0)?;
        let class_id: String = row.get(1)?;
        let teacher_id: Option<String> = row.get(2)?;
        let subject: String = row.get(3)?;
        let weekly_hours: Option<f64> = row.get(4)?;
        let teacher_name: Option<String> = row.get(5)?;
        Ok(json!({
            "id": id,
            "classId": class_id,
            "teacherId": teacher_id,
            "subject": subject,
            "weeklyHours": weekly_hours,
            "teacherName": teacher_name
        }))
    };

    let courses = match class_filter {
        Some(cid) => stmt
            .query_map([&cid], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::db_query)?;

    Ok(json!({ "courses": courses }))
}

fn courses_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    require_row(conn, "classes", &class_id, "class")?;
    let subject = req_text(params, "subject")?;
    let weekly_hours = opt_f64(params, "weeklyHours")?;
    if let Some(h) = weekly_hours {
        if h < 0.0 {
            return Err(HandlerErr::bad_params("weeklyHours must be non-negative"));
        }
    }

    let teacher_id = opt_text(params, "teacherId");
    let teacher_name = match teacher_id.as_deref() {
        Some(tid) => Some(teacher_display_name(conn, tid)?),
        None => None,
    };

    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, class_id, teacher_id, subject, weekly_hours, teacher_name)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &course_id,
            &class_id,
            teacher_id.as_deref(),
            &subject,
            weekly_hours,
            teacher_name.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "courses"))?;

    Ok(json!({ "courseId": course_id }))
}

fn courses_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(params, "courseId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    type CourseRow = (Option<String>, String, Option<f64>, Option<String>);
    let existing: Option<CourseRow> = conn
        .query_row(
            "SELECT teacher_id, subject, weekly_hours, teacher_name FROM courses WHERE id = ?",
            [&course_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((mut teacher_id, mut subject, mut weekly_hours, mut teacher_name)) = existing else {
        return Err(HandlerErr::not_found("course not found"));
    };

    if patch.get("subject").is_some() {
        subject = req_text(patch, "subject")?;
    }
    if patch.get("weeklyHours").is_some() {
        weekly_hours = opt_f64(patch, "weeklyHours")?;
        if let Some(h) = weekly_hours {
            if h < 0.0 {
                return Err(HandlerErr::bad_params("weeklyHours must be non-negative"));
            }
        }
    }
    if patch.get("teacherId").is_some() {
        // Reassignment refreshes the snapshot; explicit detach keeps the old
        // display name frozen, same as teacher deletion.
        let new_teacher = opt_text(patch, "teacherId");
        if let Some(tid) = new_teacher.as_deref() {
            teacher_name = Some(teacher_display_name(conn, tid)?);
        }
        teacher_id = new_teacher;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE courses SET teacher_id = ?, subject = ?, weekly_hours = ?, teacher_name = ?
         WHERE id = ?",
        (
            teacher_id.as_deref(),
            &subject,
            weekly_hours,
            teacher_name.as_deref(),
            &course_id,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "courses"))?;
    tx.execute(
        "UPDATE schedule_slots SET course_subject = ? WHERE course_id = ?",
        (&subject, &course_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "schedule_slots"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn courses_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let course_id = req_str(params, "courseId")?;
    require_row(conn, "courses", &course_id, "course")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM schedule_slots WHERE course_id = ?", [&course_id])
        .map_err(|e| HandlerErr::db_delete(e, "schedule_slots"))?;
    tx.execute("DELETE FROM evaluations WHERE course_id = ?", [&course_id])
        .map_err(|e| HandlerErr::db_delete(e, "evaluations"))?;
    tx.execute("DELETE FROM courses WHERE id = ?", [&course_id])
        .map_err(|e| HandlerErr::db_delete(e, "courses"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "courses.list" => Some(run(courses_list(state, &req.params))),
        "courses.create" => Some(run(courses_create(state, &req.params))),
        "courses.update" => Some(run(courses_update(state, &req.params))),
        "courses.delete" => Some(run(courses_delete(state, &req.params))),
        _ => None,
    }
}
