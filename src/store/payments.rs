//! Payments received by the studio.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::coupons;
use super::{Database, StoreError, check_amount, clean, new_id, now};
use crate::text::format_brl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Cash,
    CreditCard,
    DebitCard,
    Transfer,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::Cash => "cash",
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Transfer => "transfer",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "cash" => Self::Cash,
            "credit_card" => Self::CreditCard,
            "debit_card" => Self::DebitCard,
            "transfer" => Self::Transfer,
            _ => Self::Pix,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub client_id: Option<String>,
    pub appointment_id: Option<String>,
    /// Amount before discount.
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub coupon_code: Option<String>,
    pub method: PaymentMethod,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl Payment {
    pub fn net_cents(&self) -> i64 {
        self.amount_cents - self.discount_cents
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub amount_cents: i64,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub method: PaymentMethod,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub count: usize,
    pub gross_cents: i64,
    pub discount_cents: i64,
    pub net_cents: i64,
    pub by_method: BTreeMap<PaymentMethod, i64>,
}

const PAYMENT_COLUMNS: &str =
    "id, client_id, appointment_id, amount_cents, discount_cents, coupon_code, method, paid_at, notes";

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        client_id: row.get(1)?,
        appointment_id: row.get(2)?,
        amount_cents: row.get(3)?,
        discount_cents: row.get(4)?,
        coupon_code: row.get(5)?,
        method: PaymentMethod::from_db(&row.get::<_, String>(6)?),
        paid_at: row.get(7)?,
        notes: row.get(8)?,
    })
}

fn exists(conn: &rusqlite::Connection, table: &str, id: &str) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(&format!("SELECT 1 FROM {table} WHERE id = ?1"), params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

impl Database {
    /// Record a payment. A coupon code is validated and used up in the same
    /// transaction; an unusable coupon rejects the whole payment.
    pub fn record_payment(&self, input: PaymentInput) -> Result<Payment, StoreError> {
        if input.amount_cents <= 0 {
            return Err(StoreError::Invalid("amount_cents must be positive".into()));
        }
        check_amount(input.amount_cents, "amount_cents")?;
        let paid_at = input.paid_at.unwrap_or_else(now);
        let client_id = clean(input.client_id);
        let appointment_id = clean(input.appointment_id);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(ref id) = client_id
            && !exists(&tx, "clients", id)?
        {
            return Err(StoreError::Invalid(format!("client '{id}' does not exist")));
        }
        if let Some(ref id) = appointment_id
            && !exists(&tx, "appointments", id)?
        {
            return Err(StoreError::Invalid(format!("appointment '{id}' does not exist")));
        }

        let (discount_cents, coupon_code) = match clean(input.coupon_code) {
            Some(code) => {
                let evaluation = coupons::evaluate(&tx, &code, input.amount_cents, paid_at)?
                    .map_err(|rejection| StoreError::Invalid(format!("{code}: {}", rejection.message())))?;
                coupons::redeem(&tx, &evaluation.coupon.id)?;
                (evaluation.discount_cents, Some(evaluation.coupon.code))
            }
            None => (0, None),
        };

        let payment = Payment {
            id: new_id(),
            client_id,
            appointment_id,
            amount_cents: input.amount_cents,
            discount_cents,
            coupon_code,
            method: input.method,
            paid_at,
            notes: clean(input.notes),
        };
        tx.execute(
            "INSERT INTO payments (id, client_id, appointment_id, amount_cents, discount_cents, coupon_code, method, paid_at, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                payment.id,
                payment.client_id,
                payment.appointment_id,
                payment.amount_cents,
                payment.discount_cents,
                payment.coupon_code,
                payment.method.as_str(),
                payment.paid_at,
                payment.notes
            ],
        )?;
        tx.commit()?;
        info!(
            "Recorded payment {} of {} via {}",
            payment.id,
            format_brl(payment.net_cents()),
            payment.method.as_str()
        );
        Ok(payment)
    }

    pub fn get_payment(&self, id: &str) -> Result<Payment, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"),
            params![id],
            payment_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("payment", id))
    }

    /// Payments in `[from, to)`, newest first.
    pub fn list_payments(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE (?1 IS NULL OR paid_at >= ?1) AND (?2 IS NULL OR paid_at < ?2)
             ORDER BY paid_at DESC"
        ))?;
        let payments = stmt
            .query_map(params![from, to], payment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(payments)
    }

    /// Deleting a payment doesn't give the coupon use back.
    pub fn delete_payment(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM payments WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("payment", id));
        }
        Ok(())
    }

    pub fn payment_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<PaymentSummary, StoreError> {
        let payments = self.list_payments(from, to)?;
        let mut summary = PaymentSummary::default();
        for payment in &payments {
            summary.count += 1;
            summary.gross_cents = summary.gross_cents.saturating_add(payment.amount_cents);
            summary.discount_cents = summary.discount_cents.saturating_add(payment.discount_cents);
            let by_method = summary.by_method.entry(payment.method).or_default();
            *by_method = by_method.saturating_add(payment.net_cents());
        }
        summary.net_cents = summary.gross_cents.saturating_sub(summary.discount_cents);
        Ok(summary)
    }
}
