use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fees::{FeeError, PaymentBreakdown, PaymentStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub transaction_id: String,
    pub receipt_number: String,
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub original_amount: f64,
    pub discount_percent: f64,
    pub final_amount: f64,
    pub amount: f64,
    pub remaining_balance: f64,
    pub payment_method: String,
    pub payment_date: String,
    pub academic_year: String,
    pub plan_id: String,
    pub term_number: Option<i64>,
    pub status: String,
    pub is_full_payment: bool,
}

/// Everything a receipt freezes at payment time. Names are snapshots: a later
/// rename of the student or class never touches rows already written.
#[derive(Debug, Clone)]
pub struct NewReceipt<'a> {
    pub student_id: &'a str,
    pub student_name: &'a str,
    pub class_name: &'a str,
    pub plan_id: &'a str,
    pub breakdown: &'a PaymentBreakdown,
    pub payment_method: &'a str,
    pub payment_date: NaiveDate,
    pub academic_year: &'a str,
    pub status: PaymentStatus,
}

fn db_query(e: rusqlite::Error) -> FeeError {
    FeeError::new("db_query_failed", e.to_string())
}

/// Count + 1 under a single writer. Two concurrent calls could mint the same
/// number; the sidecar runs one operator in one process.
pub fn next_receipt_number(conn: &Connection, date: NaiveDate) -> Result<String, FeeError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM receipts", [], |r| r.get(0))
        .map_err(db_query)?;
    Ok(crate::fees::receipt_number(date, count + 1))
}

pub fn new_transaction_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let nonce: u32 = rand::random::<u32>() % 10_000;
    crate::fees::transaction_id(millis, nonce)
}

pub fn insert_receipt(conn: &Connection, new: &NewReceipt) -> Result<Receipt, FeeError> {
    let receipt = Receipt {
        id: uuid::Uuid::new_v4().to_string(),
        transaction_id: new_transaction_id(),
        receipt_number: next_receipt_number(conn, new.payment_date)?,
        student_id: new.student_id.to_string(),
        student_name: new.student_name.to_string(),
        class_name: new.class_name.to_string(),
        original_amount: new.breakdown.original_amount,
        discount_percent: new.breakdown.discount_percent,
        final_amount: new.breakdown.final_amount,
        amount: new.breakdown.amount_due,
        remaining_balance: new.breakdown.remaining_balance,
        payment_method: new.payment_method.to_string(),
        payment_date: new.payment_date.format("%Y-%m-%d").to_string(),
        academic_year: new.academic_year.to_string(),
        plan_id: new.plan_id.to_string(),
        term_number: new.breakdown.term_number,
        status: new.status.as_str().to_string(),
        is_full_payment: new.breakdown.is_full_payment,
    };

    conn.execute(
        "INSERT INTO receipts(
           id, transaction_id, receipt_number,
           student_id, student_name, class_name,
           original_amount, discount_percent, final_amount, amount, remaining_balance,
           payment_method, payment_date, academic_year,
           plan_id, term_number, status, is_full_payment
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &receipt.id,
            &receipt.transaction_id,
            &receipt.receipt_number,
            &receipt.student_id,
            &receipt.student_name,
            &receipt.class_name,
            receipt.original_amount,
            receipt.discount_percent,
            receipt.final_amount,
            receipt.amount,
            receipt.remaining_balance,
            &receipt.payment_method,
            &receipt.payment_date,
            &receipt.academic_year,
            &receipt.plan_id,
            receipt.term_number,
            &receipt.status,
            receipt.is_full_payment as i64,
        ],
    )
    .map_err(|e| FeeError::new("db_insert_failed", e.to_string()))?;

    Ok(receipt)
}

fn receipt_from_row(row: &Row) -> rusqlite::Result<Receipt> {
    Ok(Receipt {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        receipt_number: row.get(2)?,
        student_id: row.get(3)?,
        student_name: row.get(4)?,
        class_name: row.get(5)?,
        original_amount: row.get(6)?,
        discount_percent: row.get(7)?,
        final_amount: row.get(8)?,
        amount: row.get(9)?,
        remaining_balance: row.get(10)?,
        payment_method: row.get(11)?,
        payment_date: row.get(12)?,
        academic_year: row.get(13)?,
        plan_id: row.get(14)?,
        term_number: row.get(15)?,
        status: row.get(16)?,
        is_full_payment: row.get::<_, i64>(17)? != 0,
    })
}

const RECEIPT_COLUMNS: &str = "id, transaction_id, receipt_number,
   student_id, student_name, class_name,
   original_amount, discount_percent, final_amount, amount, remaining_balance,
   payment_method, payment_date, academic_year,
   plan_id, term_number, status, is_full_payment";

/// Insertion order; callers sort if chronology matters.
pub fn receipts_for_student(conn: &Connection, student_id: &str) -> Result<Vec<Receipt>, FeeError> {
    let sql = format!(
        "SELECT {} FROM receipts WHERE student_id = ? ORDER BY rowid",
        RECEIPT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).map_err(db_query)?;
    stmt.query_map([student_id], receipt_from_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query)
}

/// Status is the only mutable column on a receipt. Returns false when the
/// receipt does not exist.
pub fn update_receipt_status(
    conn: &Connection,
    receipt_id: &str,
    status: PaymentStatus,
) -> Result<bool, FeeError> {
    let changed = conn
        .execute(
            "UPDATE receipts SET status = ? WHERE id = ?",
            (status.as_str(), receipt_id),
        )
        .map_err(|e| FeeError::new("db_update_failed", e.to_string()))?;
    Ok(changed > 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSummary {
    pub total_paid: f64,
    pub total_due: f64,
    pub has_late_payments: bool,
    pub has_pending_payments: bool,
    pub is_account_settled: bool,
}

/// Read-side projection, recomputed on every call. The academic year is the
/// caller's: totals are scoped to it, while late/pending flags look across
/// all years.
pub fn balance_summary(
    conn: &Connection,
    student_id: &str,
    academic_year: &str,
) -> Result<BalanceSummary, FeeError> {
    let total_paid: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0)
             FROM receipts
             WHERE student_id = ? AND status = 'paid' AND academic_year = ?",
            (student_id, academic_year),
            |r| r.get(0),
        )
        .map_err(db_query)?;

    // Most recent receipt wins; payment dates are day-granular, so equal
    // dates fall back to insertion order.
    let total_due: f64 = conn
        .query_row(
            "SELECT remaining_balance
             FROM receipts
             WHERE student_id = ? AND academic_year = ?
             ORDER BY payment_date DESC, rowid DESC
             LIMIT 1",
            (student_id, academic_year),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_query)?
        .unwrap_or(0.0);

    let has_late_payments: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM receipts WHERE student_id = ? AND status = 'late')",
            [student_id],
            |r| r.get::<_, i64>(0),
        )
        .map_err(db_query)?
        != 0;
    let has_pending_payments: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM receipts WHERE student_id = ? AND status = 'pending')",
            [student_id],
            |r| r.get::<_, i64>(0),
        )
        .map_err(db_query)?
        != 0;

    Ok(BalanceSummary {
        total_paid,
        total_due,
        has_late_payments,
        has_pending_payments,
        is_account_settled: total_due == 0.0 && total_paid > 0.0,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpaidBalanceRow {
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub total_paid: f64,
    pub total_due: f64,
    pub has_late_payments: bool,
    pub has_pending_payments: bool,
}

/// Students that still owe for the given year, or have pending/late receipts
/// on file. Names come from each student's most recent receipt snapshot.
pub fn unpaid_balances(
    conn: &Connection,
    academic_year: &str,
) -> Result<Vec<UnpaidBalanceRow>, FeeError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT student_id FROM receipts WHERE academic_year = ? ORDER BY student_id",
        )
        .map_err(db_query)?;
    let student_ids = stmt
        .query_map([academic_year], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_query)?;

    let mut rows = Vec::new();
    for student_id in student_ids {
        let summary = balance_summary(conn, &student_id, academic_year)?;
        if summary.total_due <= 0.0 && !summary.has_late_payments && !summary.has_pending_payments {
            continue;
        }
        let (student_name, class_name): (String, String) = conn
            .query_row(
                "SELECT student_name, class_name
                 FROM receipts
                 WHERE student_id = ? AND academic_year = ?
                 ORDER BY payment_date DESC, rowid DESC
                 LIMIT 1",
                (&student_id, academic_year),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .map_err(db_query)?;
        rows.push(UnpaidBalanceRow {
            student_id,
            student_name,
            class_name,
            total_paid: summary.total_paid,
            total_due: summary.total_due,
            has_late_payments: summary.has_late_payments,
            has_pending_payments: summary.has_pending_payments,
        });
    }
    Ok(rows)
}
