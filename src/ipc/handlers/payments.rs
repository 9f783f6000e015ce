use crate::db;
use crate::fees::{compute_payment, FeeTerms, PaymentStatus, PlanKind, PAYMENT_METHODS};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::params::{opt_f64, opt_i64, opt_text, req_str, require_db};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

struct ResolvedPayment {
    student_id: String,
    student_name: String,
    class_name: String,
    plan_id: String,
    plan_name: &'static str,
    breakdown: crate::fees::PaymentBreakdown,
}

/// Shared by preview and record: resolve references, then run the pure
/// computation. No writes happen here.
fn resolve_payment(conn: &Connection, params: &Value) -> Result<ResolvedPayment, HandlerErr> {
    let student_id = req_str(params, "studentId")?;
    let student_name: Option<String> = conn
        .query_row(
            "SELECT last_name || ', ' || first_name FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some(student_name) = student_name else {
        return Err(HandlerErr::not_found("student not found"));
    };

    let schedule_id = req_str(params, "feeScheduleId")?;
    let schedule: Option<(String, f64, f64)> = conn
        .query_row(
            "SELECT class_name, yearly_amount, term_amount FROM fee_schedules WHERE id = ?",
            [&schedule_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((class_name, yearly_amount, term_amount)) = schedule else {
        return Err(HandlerErr::not_found("fee schedule not found"));
    };

    let plan_id = req_str(params, "planId")?;
    let plan_row: Option<(String, i64)> = conn
        .query_row(
            "SELECT name, installments FROM payment_plans WHERE id = ?",
            [&plan_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db_query)?;
    let Some((plan_name, installments)) = plan_row else {
        return Err(HandlerErr::not_found("payment plan not found"));
    };
    let Some(plan) = PlanKind::from_installments(installments) else {
        return Err(HandlerErr::bad_params(format!(
            "unknown payment plan: {}",
            plan_name
        )));
    };

    let discount_percent = opt_f64(params, "discountPercent")?.unwrap_or(0.0);
    let term_number = opt_i64(params, "termNumber")?;
    let free_amount = opt_f64(params, "amount")?;
    let flexible_remaining = opt_f64(params, "remainingBalance")?;

    let breakdown = compute_payment(
        plan,
        &FeeTerms {
            yearly_amount,
            term_amount,
        },
        discount_percent,
        term_number,
        free_amount,
        flexible_remaining,
    )?;

    Ok(ResolvedPayment {
        student_id,
        student_name,
        class_name,
        plan_id,
        plan_name: plan.name(),
        breakdown,
    })
}

fn payments_preview(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let resolved = resolve_payment(conn, params)?;
    let breakdown = serde_json::to_value(&resolved.breakdown)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({
        "studentId": resolved.student_id,
        "studentName": resolved.student_name,
        "className": resolved.class_name,
        "planId": resolved.plan_id,
        "planName": resolved.plan_name,
        "breakdown": breakdown
    }))
}

fn payments_record(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let resolved = resolve_payment(conn, params)?;

    let payment_method = req_str(params, "paymentMethod")?;
    if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
        return Err(HandlerErr::bad_params(format!(
            "paymentMethod must be one of {}",
            PAYMENT_METHODS.join(", ")
        )));
    }

    let payment_date = match opt_text(params, "paymentDate") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params("paymentDate must be YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    // Explicit year first; the school default is the configured fallback.
    // Never derived from the clock down here.
    let academic_year = match opt_text(params, "academicYear") {
        Some(y) => y,
        None => {
            let configured = db::settings_get_json(conn, "settings.school")
                .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
                .and_then(|v| {
                    v.get("defaultAcademicYear")
                        .and_then(|y| y.as_str())
                        .map(|s| s.to_string())
                })
                .filter(|s| !s.is_empty());
            configured.ok_or_else(|| {
                HandlerErr::bad_params(
                    "missing academicYear and no school.defaultAcademicYear configured",
                )
            })?
        }
    };

    let status = match opt_text(params, "status") {
        Some(raw) => PaymentStatus::parse(&raw)
            .ok_or_else(|| HandlerErr::bad_params("status must be paid, pending or late"))?,
        None => PaymentStatus::Paid,
    };

    let receipt = ledger::insert_receipt(
        conn,
        &ledger::NewReceipt {
            student_id: &resolved.student_id,
            student_name: &resolved.student_name,
            class_name: &resolved.class_name,
            plan_id: &resolved.plan_id,
            breakdown: &resolved.breakdown,
            payment_method: &payment_method,
            payment_date,
            academic_year: &academic_year,
            status,
        },
    )?;

    let receipt = serde_json::to_value(&receipt)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "receipt": receipt }))
}

fn receipts_list_by_student(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = req_str(params, "studentId")?;
    let receipts = ledger::receipts_for_student(conn, &student_id)?;
    let receipts = serde_json::to_value(&receipts)
        .map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    Ok(json!({ "receipts": receipts }))
}

fn receipts_update_status(state: &AppState, params: &Value) -> Result<Value, HandlerErr> {
    let conn = require_db(state)?;
    let receipt_id = req_str(params, "receiptId")?;
    let status_raw = req_str(params, "status")?;
    let status = PaymentStatus::parse(&status_raw)
        .ok_or_else(|| HandlerErr::bad_params("status must be paid, pending or late"))?;

    if !ledger::update_receipt_status(conn, &receipt_id, status)? {
        return Err(HandlerErr::not_found("receipt not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let run = |r: Result<Value, HandlerErr>| match r {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    };
    match req.method.as_str() {
        "payments.preview" => Some(run(payments_preview(state, &req.params))),
        "payments.record" => Some(run(payments_record(state, &req.params))),
        "receipts.listByStudent" => Some(run(receipts_list_by_student(state, &req.params))),
        "receipts.updateStatus" => Some(run(receipts_update_status(state, &req.params))),
        _ => None,
    }
}
