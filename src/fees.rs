use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Methods accepted on a receipt, as stored and as sent over the wire.
pub const PAYMENT_METHODS: &[&str] = &["card", "cash", "transfer", "check", "mobile"];

#[derive(Debug, Clone, Serialize)]
pub struct FeeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl FeeError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Full,
    Trimestral,
    Flexible,
}

impl PlanKind {
    /// The installment count is what the computation keys on; 0 denotes the
    /// unconstrained flexible plan.
    pub fn from_installments(installments: i64) -> Option<Self> {
        match installments {
            1 => Some(Self::Full),
            3 => Some(Self::Trimestral),
            0 => Some(Self::Flexible),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Trimestral => "trimestral",
            Self::Flexible => "flexible",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Pending,
    Late,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(Self::Paid),
            "pending" => Some(Self::Pending),
            "late" => Some(Self::Late),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Pending => "pending",
            Self::Late => "late",
        }
    }
}

/// Per-term tuition, rounded UP to the next whole currency unit so that three
/// terms always cover the yearly amount.
pub fn derive_term_amount(yearly_amount: f64) -> f64 {
    (yearly_amount / 3.0).ceil()
}

/// The "{year}-{year+1}" label the rest of the system keys receipts on.
/// Callers compute it once from their own notion of "today" and thread it
/// through; nothing below this reads the wall clock.
pub fn academic_year_label(today: NaiveDate) -> String {
    format!("{}-{}", today.year(), today.year() + 1)
}

/// Global sequence, not per student: the Nth receipt overall in month MM of
/// year YY is RECU-YYMM-000N.
pub fn receipt_number(date: NaiveDate, sequence: i64) -> String {
    format!(
        "RECU-{:02}{:02}-{:04}",
        date.year() % 100,
        date.month(),
        sequence
    )
}

/// Millisecond timestamp plus a nonce. Collisions are possible in principle
/// and irrelevant for one operator at one desk.
pub fn transaction_id(epoch_millis: u128, nonce: u32) -> String {
    format!("TRX-{}-{}", epoch_millis, nonce % 10_000)
}

/// Amounts a fee schedule contributes to a payment computation.
#[derive(Debug, Clone, Copy)]
pub struct FeeTerms {
    pub yearly_amount: f64,
    pub term_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBreakdown {
    pub original_amount: f64,
    pub discount_percent: f64,
    pub discount_amount: f64,
    pub final_amount: f64,
    pub amount_due: f64,
    pub remaining_balance: f64,
    pub is_full_payment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_number: Option<i64>,
}

/// Pure and idempotent: same inputs, same breakdown, no reads, no writes.
///
/// `term_number` is required for the trimestral plan and rejected elsewhere.
/// `free_amount` is required for the flexible plan and rejected elsewhere.
/// `flexible_remaining` is the operator-declared balance for flexible
/// receipts; full and trimestral always derive their own.
pub fn compute_payment(
    plan: PlanKind,
    terms: &FeeTerms,
    discount_percent: f64,
    term_number: Option<i64>,
    free_amount: Option<f64>,
    flexible_remaining: Option<f64>,
) -> Result<PaymentBreakdown, FeeError> {
    if !discount_percent.is_finite() || !(0.0..=100.0).contains(&discount_percent) {
        return Err(FeeError::bad_params(
            "discountPercent must be between 0 and 100",
        ));
    }
    if !terms.yearly_amount.is_finite() || terms.yearly_amount < 0.0 {
        return Err(FeeError::bad_params("yearly amount must be non-negative"));
    }

    let (original_amount, term_number) = match plan {
        PlanKind::Full => {
            if term_number.is_some() {
                return Err(FeeError::bad_params(
                    "termNumber only applies to the trimestral plan",
                ));
            }
            (terms.yearly_amount, None)
        }
        PlanKind::Trimestral => {
            let term = term_number
                .ok_or_else(|| FeeError::bad_params("missing termNumber for trimestral plan"))?;
            if !(1..=3).contains(&term) {
                return Err(FeeError::bad_params("termNumber must be 1, 2 or 3"));
            }
            (terms.term_amount, Some(term))
        }
        PlanKind::Flexible => {
            if term_number.is_some() {
                return Err(FeeError::bad_params(
                    "termNumber only applies to the trimestral plan",
                ));
            }
            let amount = free_amount
                .ok_or_else(|| FeeError::bad_params("missing amount for flexible plan"))?;
            if !amount.is_finite() || amount <= 0.0 {
                return Err(FeeError::bad_params("amount must be a positive number"));
            }
            (amount, None)
        }
    };

    let discount_amount = original_amount * discount_percent / 100.0;
    let final_amount = original_amount - discount_amount;

    let remaining_balance = match plan {
        PlanKind::Full => 0.0,
        PlanKind::Trimestral => {
            let term = term_number.unwrap_or(3);
            (terms.term_amount * (3 - term) as f64).max(0.0)
        }
        PlanKind::Flexible => {
            let declared = flexible_remaining.unwrap_or(0.0);
            if !declared.is_finite() || declared < 0.0 {
                return Err(FeeError::bad_params(
                    "remainingBalance must be non-negative",
                ));
            }
            declared
        }
    };

    Ok(PaymentBreakdown {
        original_amount,
        discount_percent,
        discount_amount,
        final_amount,
        amount_due: final_amount,
        remaining_balance,
        is_full_payment: remaining_balance == 0.0,
        term_number,
    })
}
