use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_text, req_f64, req_i64_range, req_str, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

const OUT_OF: f64 = 20.0;

fn parse_eval_date(value: Option<String>) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = value else { return Ok(None) };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    Ok(Some(raw))
}

fn check_score(score: f64) -> Result<(), HandlerErr> {
    if !(0.0..=OUT_OF).contains(&score) {
        return Err(HandlerErr::bad_params("score must be between 0 and 20"));
    }
    Ok(())
}

fn evaluations_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_filter = opt_text(params, "studentId");
    let course_filter = opt_text(params, "courseId");
    if student_filter.is_none() && course_filter.is_none() {
        return Err(HandlerErr::bad_params("missing studentId or courseId"));
    }

    let mut sql = String::from(
        "SELECT e.id, e.student_id, e.course_id, c.subject, e.term, e.score, e.out_of, e.date, e.remark
         FROM evaluations e
         JOIN courses c ON c.id = e.course_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(sid) = student_filter {
        sql.push_str(" AND e.student_id = ?");
        binds.push(sid);
    }
    if let Some(cid) = course_filter {
        sql.push_str(" AND e.course_id = ?");
        binds.push(cid);
    }
    sql.push_str(" ORDER BY e.term, e.date, e.rowid");

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db_query)?;
    let evaluations = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |row| {
            let id: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let course_id: String = row.get(2)?;
            let course_subject: String = row.get(3)?;
            let term: i64 = row.get(4)?;
            let score: f64 = row.get(5)?;
            let out_of: f64 = row.get(6)?;
            let date: Option<String> = row.get(7)?;
            let remark: Option<String> = row.get(8)?;
            Ok(json!({
                "id": id,
                "studentId": student_id,
                "courseId": course_id,
                "courseSubject": course_subject,
                "term": term,
                "score": score,
                "outOf": out_of,
                "date": date,
                "remark": remark
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "evaluations": evaluations }))
}

fn evaluations_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(params, "studentId")?;
    require_row(conn, "students", &student_id, "student")?;
    let course_id = req_str(params, "courseId")?;
    require_row(conn, "courses", &course_id, "course")?;
    let term = req_i64_range(params, "term", 1, 3)?;
    let score = req_f64(params, "score")?;
    check_score(score)?;
    let date = parse_eval_date(opt_text(params, "date"))?;
    let remark = opt_text(params, "remark");

    let evaluation_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO evaluations(id, student_id, course_id, term, score, out_of, date, remark)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &evaluation_id,
            &student_id,
            &course_id,
            term,
            score,
            OUT_OF,
            date.as_deref(),
            remark.as_deref(),
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "evaluations"))?;

    Ok(json!({ "evaluationId": evaluation_id }))
}

fn evaluations_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let evaluation_id = req_str(params, "evaluationId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    type EvalRow = (i64, f64, Option<String>, Option<String>);
    let existing: Option<EvalRow> = conn
        .query_row(
            "SELECT term, score, date, remark FROM evaluations WHERE id = ?",
            [&evaluation_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((mut term, mut score, mut date, mut remark)) = existing else {
        return Err(HandlerErr::not_found("evaluation not found"));
    };

    if patch.get("term").is_some() {
        term = req_i64_range(patch, "term", 1, 3)?;
    }
    if patch.get("score").is_some() {
        score = req_f64(patch, "score")?;
        check_score(score)?;
    }
    if patch.get("date").is_some() {
        date = parse_eval_date(opt_text(patch, "date"))?;
    }
    if patch.get("remark").is_some() {
        remark = opt_text(patch, "remark");
    }

    conn.execute(
        "UPDATE evaluations SET term = ?, score = ?, date = ?, remark = ? WHERE id = ?",
        (term, score, date.as_deref(), remark.as_deref(), &evaluation_id),
    )
    .map_err(|e| HandlerErr::db_update(e, "evaluations"))?;

    Ok(json!({ "ok": true }))
}

fn evaluations_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let evaluation_id = req_str(params, "evaluationId")?;
    let removed = conn
        .execute("DELETE FROM evaluations WHERE id = ?", [&evaluation_id])
        .map_err(|e| HandlerErr::db_delete(e, "evaluations"))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("evaluation not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "evaluations.list" => Some(run(evaluations_list(state, &req.params))),
        "evaluations.create" => Some(run(evaluations_create(state, &req.params))),
        "evaluations.update" => Some(run(evaluations_update(state, &req.params))),
        "evaluations.delete" => Some(run(evaluations_delete(state, &req.params))),
        _ => None,
    }
}
