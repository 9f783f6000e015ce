use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_bool, opt_text, req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn parse_birth_date(value: Option<String>) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = value else { return Ok(None) };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("birthDate must be YYYY-MM-DD"))?;
    Ok(Some(raw))
}

fn next_sort_order(conn: &Connection, class_id: Option<&str>) -> Result<i64, HandlerErr> {
    let Some(class_id) = class_id else {
        return Ok(0);
    };
    conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )
    .map_err(HandlerErr::db_query)
}

fn students_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "students": [] }));
    };

    let class_filter = opt_text(params, "classId");
    let sql = match class_filter {
        Some(_) => {
            "SELECT s.id, s.class_id, c.name, s.last_name, s.first_name,
                    s.student_no, s.birth_date, s.active, s.sort_order
             FROM students s
             LEFT JOIN classes c ON c.id = s.class_id
             WHERE s.class_id = ?
             ORDER BY s.sort_order"
        }
        None => {
            "SELECT s.id, s.class_id, c.name, s.last_name, s.first_name,
                    s.student_no, s.birth_date, s.active, s.sort_order
             FROM students s
             LEFT JOIN classes c ON c.id = s.class_id
             ORDER BY s.last_name, s.first_name"
        }
    };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db_query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<Value> {
        let id: String = row.get(0)?;
        let class_id: Option<String> = row.get(1)?;
        let class_name: Option<String> = row.get(2)?;
        let last_name: String = row.get(3)?;
        let first_name: String = row.get(4)?;
        let student_no: Option<String> = row.get(5)?;
        let birth_date: Option<String> = row.get(6)?;
        let active: i64 = row.get(7)?;
        let sort_order: i64 = row.get(8)?;
        Ok(json!({
            "id": id,
            "classId": class_id,
            "className": class_name,
            "lastName": last_name,
            "firstName": first_name,
            "displayName": format!("{}, {}", last_name, first_name),
            "studentNo": student_no,
            "birthDate": birth_date,
            "active": active != 0,
            "sortOrder": sort_order
        }))
    };

    let students = match class_filter {
        Some(cid) => stmt
            .query_map([&cid], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::db_query)?;

    Ok(json!({ "students": students }))
}

fn students_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let last_name = req_text(params, "lastName")?;
    let first_name = req_text(params, "firstName")?;
    let class_id = opt_text(params, "classId");
    if let Some(cid) = class_id.as_deref() {
        require_row(conn, "classes", cid, "class")?;
    }
    let student_no = opt_text(params, "studentNo");
    let birth_date = parse_birth_date(opt_text(params, "birthDate"))?;
    let active = opt_bool(params, "active", true);

    let sort_order = next_sort_order(conn, class_id.as_deref())?;
    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(
           id, class_id, last_name, first_name, student_no, birth_date, active, sort_order
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            class_id.as_deref(),
            &last_name,
            &first_name,
            student_no.as_deref(),
            birth_date.as_deref(),
            active as i64,
            sort_order,
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "students"))?;

    Ok(json!({ "studentId": student_id }))
}

fn students_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(params, "studentId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    type StudentRow = (
        Option<String>,
        String,
        String,
        Option<String>,
        Option<String>,
        i64,
        i64,
    );
    let existing: Option<StudentRow> = conn
        .query_row(
            "SELECT class_id, last_name, first_name, student_no, birth_date, active, sort_order
             FROM students WHERE id = ?",
            [&student_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((
        mut class_id,
        mut last_name,
        mut first_name,
        mut student_no,
        mut birth_date,
        mut active,
        mut sort_order,
    )) = existing
    else {
        return Err(HandlerErr::not_found("student not found"));
    };

    if patch.get("lastName").is_some() {
        last_name = req_text(patch, "lastName")?;
    }
    if patch.get("firstName").is_some() {
        first_name = req_text(patch, "firstName")?;
    }
    if patch.get("studentNo").is_some() {
        student_no = opt_text(patch, "studentNo");
    }
    if patch.get("birthDate").is_some() {
        birth_date = parse_birth_date(opt_text(patch, "birthDate"))?;
    }
    if let Some(v) = patch.get("active").and_then(|v| v.as_bool()) {
        active = v as i64;
    }
    if patch.get("classId").is_some() {
        let new_class = opt_text(patch, "classId");
        if let Some(cid) = new_class.as_deref() {
            require_row(conn, "classes", cid, "class")?;
        }
        if new_class != class_id {
            // Moving class places the student at the end of the new roster.
            sort_order = next_sort_order(conn, new_class.as_deref())?;
            class_id = new_class;
        }
    }

    conn.execute(
        "UPDATE students
         SET class_id = ?, last_name = ?, first_name = ?, student_no = ?,
             birth_date = ?, active = ?, sort_order = ?
         WHERE id = ?",
        (
            class_id.as_deref(),
            &last_name,
            &first_name,
            student_no.as_deref(),
            birth_date.as_deref(),
            active,
            sort_order,
            &student_id,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "students"))?;

    Ok(json!({ "ok": true }))
}

fn students_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(params, "studentId")?;
    require_row(conn, "students", &student_id, "student")?;

    // Receipts are never deleted: they keep the frozen name snapshot even
    // after the student record goes.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("DELETE FROM evaluations WHERE student_id = ?", [&student_id])
        .map_err(|e| HandlerErr::db_delete(e, "evaluations"))?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::db_delete(e, "students"))?;
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
        "students.list" => Some(run(students_list(state, &req.params))),
        "students.create" => Some(run(students_create(state, &req.params))),
        "students.update" => Some(run(students_update(state, &req.params))),
        "students.delete" => Some(run(students_delete(state, &req.params))),
        _ => None,
    }
}
