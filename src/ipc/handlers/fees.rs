use crate::fees::derive_term_amount;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_f64, opt_text, req_f64, req_str, req_text, require_db};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

fn check_amount(value: f64, key: &str) -> Result<(), HandlerErr> {
    if value < 0.0 {
        return Err(HandlerErr::bad_params(format!(
            "{} must be non-negative",
            key
        )));
    }
    Ok(())
}

fn fee_schedules_list(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let Some(conn) = state.db.as_ref() else {
        return Ok(json!({ "feeSchedules": [] }));
    };

    let class_filter = opt_text(params, "classId");
    let sql = match class_filter {
        Some(_) => {
            "SELECT id, class_id, class_name, yearly_amount, registration_fee, term_amount, academic_year
             FROM fee_schedules WHERE class_id = ?
             ORDER BY class_name, academic_year, rowid"
        }
        None => {
            "SELECT id, class_id, class_name, yearly_amount, registration_fee, term_amount, academic_year
             FROM fee_schedules
             ORDER BY class_name, academic_year, rowid"
        }
    };
    let mut stmt = conn.prepare(sql).map_err(HandlerErr::db_query)?;

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<Value> {
        let id: String = row.get(0)?;
        let class_id: String = row.get(1)?;
        let class_name: String = row.get(2)?;
        let yearly_amount: f64 = row.get(3)?;
        let registration_fee: f64 = row.get(4)?;
        let term_amount: f64 = row.get(5)?;
        let academic_year: String = row.get(6)?;
        Ok(json!({
            "id": id,
            "classId": class_id,
            "className": class_name,
            "yearlyAmount": yearly_amount,
            "registrationFee": registration_fee,
            "termAmount": term_amount,
            "academicYear": academic_year
        }))
    };

    let schedules = match class_filter {
        Some(cid) => stmt
            .query_map([&cid], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(HandlerErr::db_query)?;

    Ok(json!({ "feeSchedules": schedules }))
}

fn fee_schedules_create(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = req_str(params, "classId")?;
    let class_name: Option<String> = conn
        .query_row("SELECT name FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(class_name) = class_name else {
        return Err(HandlerErr::not_found("class not found"));
    };

    let yearly_amount = req_f64(params, "yearlyAmount")?;
    check_amount(yearly_amount, "yearlyAmount")?;
    let registration_fee = opt_f64(params, "registrationFee")?.unwrap_or(0.0);
    check_amount(registration_fee, "registrationFee")?;
    let academic_year = req_text(params, "academicYear")?;

    // A client-supplied termAmount is ignored: always recomputed here.
    let term_amount = derive_term_amount(yearly_amount);

    let schedule_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO fee_schedules(
           id, class_id, class_name, yearly_amount, registration_fee, term_amount, academic_year
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &schedule_id,
            &class_id,
            &class_name,
            yearly_amount,
            registration_fee,
            term_amount,
            &academic_year,
        ),
    )
    .map_err(|e| HandlerErr::db_insert(e, "fee_schedules"))?;

    Ok(json!({
        "feeScheduleId": schedule_id,
        "termAmount": term_amount
    }))
}

fn fee_schedules_update(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let schedule_id = req_str(params, "feeScheduleId")?;
    let patch = params
        .get("patch")
        .filter(|v| v.is_object())
        .ok_or_else(|| HandlerErr::bad_params("missing patch"))?;

    let existing: Option<(f64, f64, String)> = conn
        .query_row(
            "SELECT yearly_amount, registration_fee, academic_year FROM fee_schedules WHERE id = ?",
            [&schedule_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((mut yearly_amount, mut registration_fee, mut academic_year)) = existing else {
        return Err(HandlerErr::not_found("fee schedule not found"));
    };

    if patch.get("yearlyAmount").is_some() {
        yearly_amount = req_f64(patch, "yearlyAmount")?;
        check_amount(yearly_amount, "yearlyAmount")?;
    }
    if patch.get("registrationFee").is_some() {
        registration_fee = req_f64(patch, "registrationFee")?;
        check_amount(registration_fee, "registrationFee")?;
    }
    if patch.get("academicYear").is_some() {
        academic_year = req_text(patch, "academicYear")?;
    }

    // termAmount is never patched directly; it tracks yearlyAmount.
    let term_amount = derive_term_amount(yearly_amount);
    conn.execute(
        "UPDATE fee_schedules
         SET yearly_amount = ?, registration_fee = ?, term_amount = ?, academic_year = ?
         WHERE id = ?",
        (
            yearly_amount,
            registration_fee,
            term_amount,
            &academic_year,
            &schedule_id,
        ),
    )
    .map_err(|e| HandlerErr::db_update(e, "fee_schedules"))?;

    Ok(json!({ "ok": true, "termAmount": term_amount }))
}

fn fee_schedules_delete(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let schedule_id = req_str(params, "feeScheduleId")?;
    let removed = conn
        .execute("DELETE FROM fee_schedules WHERE id = ?", [&schedule_id])
        .map_err(|e| HandlerErr::db_delete(e, "fee_schedules"))?;
    if removed == 0 {
        return Err(HandlerErr::not_found("fee schedule not found"));
    }
    Ok(json!({ "ok": true }))
}

fn plans_list(state: &AppState) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, name, description, installments FROM payment_plans ORDER BY rowid",
        )
        .map_err(HandlerErr::db_query)?;
    let plans = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let description: String = row.get(2)?;
            let installments: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "description": description,
                "installments": installments
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;

    Ok(json!({ "plans": plans }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "feeSchedules.list" => Some(run(fee_schedules_list(state, &req.params))),
        "feeSchedules.create" => Some(run(fee_schedules_create(state, &req.params))),
        "feeSchedules.update" => Some(run(fee_schedules_update(state, &req.params))),
        "feeSchedules.delete" => Some(run(fee_schedules_delete(state, &req.params))),
        "plans.list" => Some(run(plans_list(state))),
        _ => None,
    }
}
