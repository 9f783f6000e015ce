use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{req_str, req_text, require_db, require_row};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use serde_json::{json, Value};

fn balances_student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(params, "studentId")?;
    require_row(conn, "students", &student_id, "student")?;
    // The caller owns the notion of "current year" and passes it down.
    let academic_year = req_text(params, "academicYear")?;

    let summary = ledger::balance_summary(conn, &student_id, &academic_year)?;
    let summary = serde_json::to_value(&summary)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({
        "studentId": student_id,
        "academicYear": academic_year,
        "summary": summary
    }))
}

fn reports_unpaid_balances(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let academic_year = req_text(params, "academicYear")?;

    let rows = ledger::unpaid_balances(conn, &academic_year)?;
    let rows =
        serde_json::to_value(&rows).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({
        "academicYear": academic_year,
        "rows": rows
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "balances.student" => Some(run(balances_student(state, &req.params))),
        "reports.unpaidBalances" => Some(run(reports_unpaid_balances(state, &req.params))),
        _ => None,
    }
}
