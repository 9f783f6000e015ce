use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_text, req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

fn classes_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };

    // Counts via correlated subqueries so joins can't double-count.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.level,
               c.academic_year,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
               (SELECT COUNT(*) FROM courses co WHERE co.class_id = c.id) AS course_count
             FROM classes c
             ORDER BY c.name",
        )
        .map_err(HandlerErr::db_query)?;

    let classes = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let level: Option<String> = row.get(2)?;
            let academic_year: Option<String> = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let course_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "level": level,
                "academicYear": academic_year,
                "studentCount": student_count,
                "courseCount": course_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "classes": classes }))
}

fn classes_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = req_text(params, "name")?;
    let level = opt_text(params, "level");
    let academic_year = opt_text(params, "academicYear");

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, level, academic_year) VALUES(?, ?, ?, ?)",
        (&class_id, &name, level.as_deref(), academic_year.as_deref()),
    )
    .map_err(|e| HandlerErr::db_insert(e, "classes"))?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let existing: Option<(String, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT name, level, academic_year FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((mut name, mut level, mut academic_year)) = existing else {
        return Err(HandlerErr::not_found("class not found"));
    };

    if patch.get("name").is_some() {
        name = req_text(patch, "name")?;
    }
    if patch.get("level").is_some() {
        level = opt_text(patch, "level");
    }
    if patch.get("academicYear").is_some() {
        academic_year = opt_text(patch, "academicYear");
    }

    // Class display names are live on non-financial records: fee schedules
    // follow a rename, receipts keep their snapshot.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE classes SET name = ?, level = ?, academic_year = ? WHERE id = ?",
        (&name, level.as_deref(), academic_year.as_deref(), &class_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "classes"))?;
    tx.execute(
        "UPDATE fee_schedules SET class_name = ? WHERE class_id = ?",
        (&name, &class_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "fee_schedules"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn classes_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    require_row(conn, "classes", &class_id, "class")?;

    // One transaction: dependents first, students unassigned (not deleted),
    // then the class row. No ON DELETE CASCADE in the schema.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tx.execute(
        "DELETE FROM evaluations
         WHERE course_id IN (SELECT id FROM courses WHERE class_id = ?)",
        [&class_id],
    )
    .map_err(|e| HandlerErr::db_delete(e, "evaluations"))?;

    tx.execute("DELETE FROM schedule_slots WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db_delete(e, "schedule_slots"))?;

    tx.execute("DELETE FROM courses WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db_delete(e, "courses"))?;

    tx.execute("DELETE FROM fee_schedules WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db_delete(e, "fee_schedules"))?;

    tx.execute(
        "UPDATE students SET class_id = NULL WHERE class_id = ?",
        [&class_id],
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;

    tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(|e| HandlerErr::db_delete(e, "classes"))?;

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
        "classes.list" => Some(run(classes_list(state))),
        "classes.create" => Some(run(classes_create(state, &req.params))),
        "classes.update" => Some(run(classes_update(state, &req.params))),
        "classes.delete" => Some(run(classes_delete(state, &req.params))),
        _ => None,
    }
}
