use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_text, req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

fn display_name(last: &str, first: &str) -> String {
    format!("{}, {}", last, first)
}

fn teachers_list(state: &AppState) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "teachers": [] }));
    };

    let mut stmt = conn
        .prepare(
            "SELECT
               t.id,
               t.last_name,
               t.first_name,
               t.subject,
               t.phone,
               (SELECT COUNT(*) FROM courses c WHERE c.teacher_id = t.id) AS course_count
             FROM teachers t
             ORDER BY t.last_name, t.first_name",
        )
        .map_err(HandlerErr::db_query)?;

    let teachers = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let last_name: String = row.get(1)?;
            let first_name: String = row.get(2)?;
            let subject: Option<String> = row.get(3)?;
            let phone: Option<String> = row.get(4)?;
            let course_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "lastName": last_name,
                "firstName": first_name,
                "displayName": display_name(&last_name, &first_name),
                "subject": subject,
                "phone": phone,
                "courseCount": course_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "teachers": teachers }))
}

fn teachers_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let last_name = req_text(params, "lastName")?;
    let first_name = req_text(params, "firstName")?;
    let subject = opt_text(params, "subject");
    let phone = opt_text(params, "phone");

    let teacher_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, last_name, first_name, subject, phone)
         VALUES(?, ?, ?, ?, ?)",
        (
            &teacher_id,
            &last_name,
            &first_name,
            subject.as_deref(),
            phone.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "teachers"))?;

    Ok(json!({ "teacherId": teacher_id }))
}

fn teachers_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let teacher_id = req_str(params, "teacherId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let existing: Option<(String, String, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT last_name, first_name, subject, phone FROM teachers WHERE id = ?",
            [&teacher_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((mut last_name, mut first_name, mut subject, mut phone)) = existing else {
        return Err(HandlerErr::not_found("teacher not found"));
    };

    if patch.get("lastName").is_some() {
        last_name = req_text(patch, "lastName")?;
    }
    if patch.get("firstName").is_some() {
        first_name = req_text(patch, "firstName")?;
    }
    if patch.get("subject").is_some() {
        subject = opt_text(patch, "subject");
    }
    if patch.get("phone").is_some() {
        phone = opt_text(patch, "phone");
    }

    // A rename follows through to course display names; receipts already
    // written keep whatever name they froze.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE teachers SET last_name = ?, first_name = ?, subject = ?, phone = ? WHERE id = ?",
        (
            &last_name,
            &first_name,
            subject.as_deref(),
            phone.as_deref(),
            &teacher_id,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "teachers"))?;
    tx.execute(
        "UPDATE courses SET teacher_name = ? WHERE teacher_id = ?",
        (display_name(&last_name, &first_name), &teacher_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "courses"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "ok": true }))
}

fn teachers_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let teacher_id = req_str(params, "teacherId")?;
    require_row(conn, "teachers", &teacher_id, "teacher")?;

    // Courses survive with the frozen display name; only the link is cut.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "UPDATE courses SET teacher_id = NULL WHERE teacher_id = ?",
        [&teacher_id],
    )
    .map_err(|e| HandlerErr::db_update(e, "courses"))?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [&teacher_id])
        .map_err(|e| HandlerErr::db_delete(e, "teachers"))?;
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
        "teachers.list" => Some(run(teachers_list(state))),
        "teachers.create" => Some(run(teachers_create(state, &req.params))),
        "teachers.update" => Some(run(teachers_update(state, &req.params))),
        "teachers.delete" => Some(run(teachers_delete(state, &req.params))),
        _ => None,
    }
}
