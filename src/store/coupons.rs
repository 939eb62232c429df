//! Discount coupons and their redemption rules.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Database, StoreError, check_amount, clean, new_id, now, required};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Whole percent, 1..=100.
    Percent(i64),
    /// Fixed amount in cents.
    Fixed(i64),
}

impl Discount {
    fn validate(self) -> Result<(), StoreError> {
        match self {
            Self::Percent(p) if !(1..=100).contains(&p) => {
                Err(StoreError::Invalid("percent discount must be between 1 and 100".into()))
            }
            Self::Fixed(c) if c <= 0 => Err(StoreError::Invalid("fixed discount must be positive".into())),
            Self::Fixed(c) => check_amount(c, "fixed discount").map(|_| ()),
            Self::Percent(_) => Ok(()),
        }
    }

    /// Discount in cents for `amount_cents`, never more than the amount itself.
    pub fn apply(self, amount_cents: i64) -> i64 {
        let amount = amount_cents.max(0);
        let raw = match self {
            Self::Percent(p) => i64::try_from(i128::from(amount) * i128::from(p) / 100).unwrap_or(amount),
            Self::Fixed(c) => c,
        };
        raw.clamp(0, amount)
    }

    fn parts(self) -> (&'static str, i64) {
        match self {
            Self::Percent(p) => ("percent", p),
            Self::Fixed(c) => ("fixed", c),
        }
    }

    fn from_parts(kind: &str, value: i64) -> Self {
        match kind {
            "fixed" => Self::Fixed(value),
            _ => Self::Percent(value),
        }
    }

    /// "10%" or "R$ 50,00".
    pub fn label(self) -> String {
        match self {
            Self::Percent(p) => format!("{p}%"),
            Self::Fixed(c) => crate::text::format_brl(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    pub code: String,
    pub description: Option<String>,
    pub discount: Discount,
    pub max_uses: Option<i64>,
    pub uses: i64,
    pub valid_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponInput {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount: Discount,
    #[serde(default)]
    pub max_uses: Option<i64>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Why a coupon can't be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    Exhausted,
}

impl CouponRejection {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "coupon not found",
            Self::Inactive => "coupon is not active",
            Self::Expired => "coupon has expired",
            Self::Exhausted => "coupon has no uses left",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouponEvaluation {
    pub coupon: Coupon,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
}

const COUPON_COLUMNS: &str =
    "id, code, description, discount_kind, discount_value, max_uses, uses, valid_until, active, created_at";

fn coupon_from_row(row: &Row<'_>) -> rusqlite::Result<Coupon> {
    Ok(Coupon {
        id: row.get(0)?,
        code: row.get(1)?,
        description: row.get(2)?,
        discount: Discount::from_parts(&row.get::<_, String>(3)?, row.get(4)?),
        max_uses: row.get(5)?,
        uses: row.get(6)?,
        valid_until: row.get(7)?,
        active: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}

pub(crate) fn find_by_code(conn: &Connection, code: &str) -> Result<Option<Coupon>, StoreError> {
    let coupon = conn
        .query_row(
            &format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code_key = ?1"),
            params![code_key(code)],
            coupon_from_row,
        )
        .optional()?;
    Ok(coupon)
}

/// Check a coupon against an amount without using it up.
pub(crate) fn evaluate(
    conn: &Connection,
    code: &str,
    amount_cents: i64,
    at: DateTime<Utc>,
) -> Result<Result<CouponEvaluation, CouponRejection>, StoreError> {
    let Some(coupon) = find_by_code(conn, code)? else {
        return Ok(Err(CouponRejection::NotFound));
    };
    if !coupon.active {
        return Ok(Err(CouponRejection::Inactive));
    }
    if coupon.valid_until.is_some_and(|until| at > until) {
        return Ok(Err(CouponRejection::Expired));
    }
    if coupon.max_uses.is_some_and(|max| coupon.uses >= max) {
        return Ok(Err(CouponRejection::Exhausted));
    }
    let discount_cents = coupon.discount.apply(amount_cents);
    Ok(Ok(CouponEvaluation {
        coupon,
        amount_cents,
        discount_cents,
        final_cents: amount_cents - discount_cents,
    }))
}

pub(crate) fn redeem(conn: &Connection, coupon_id: &str) -> Result<(), StoreError> {
    conn.execute("UPDATE coupons SET uses = uses + 1 WHERE id = ?1", params![coupon_id])?;
    Ok(())
}

impl Database {
    pub fn create_coupon(&self, input: CouponInput) -> Result<Coupon, StoreError> {
        let code = required(&input.code, "code")?;
        input.discount.validate()?;
        if input.max_uses.is_some_and(|m| m <= 0) {
            return Err(StoreError::Invalid("max_uses must be positive".into()));
        }
        let conn = self.conn()?;
        if find_by_code(&conn, &code)?.is_some() {
            return Err(StoreError::Conflict(format!("coupon '{code}' already exists")));
        }
        let coupon = Coupon {
            id: new_id(),
            code,
            description: clean(input.description),
            discount: input.discount,
            max_uses: input.max_uses,
            uses: 0,
            valid_until: input.valid_until,
            active: input.active,
            created_at: now(),
        };
        let (kind, value) = coupon.discount.parts();
        conn.execute(
            "INSERT INTO coupons (id, code, code_key, description, discount_kind, discount_value, max_uses, uses, valid_until, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?10)",
            params![
                coupon.id,
                coupon.code,
                code_key(&coupon.code),
                coupon.description,
                kind,
                value,
                coupon.max_uses,
                coupon.valid_until,
                coupon.active,
                coupon.created_at
            ],
        )?;
        info!("Created coupon {} ({})", coupon.code, coupon.discount.label());
        Ok(coupon)
    }

    pub fn get_coupon(&self, id: &str) -> Result<Coupon, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?1"),
            params![id],
            coupon_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("coupon", id))
    }

    pub fn list_coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC"))?;
        let coupons = stmt
            .query_map([], coupon_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(coupons)
    }

    /// Replace a coupon's settings. The use counter is kept.
    pub fn update_coupon(&self, id: &str, input: CouponInput) -> Result<Coupon, StoreError> {
        let code = required(&input.code, "code")?;
        input.discount.validate()?;
        {
            let conn = self.conn()?;
            if let Some(existing) = find_by_code(&conn, &code)?
                && existing.id != id
            {
                return Err(StoreError::Conflict(format!("coupon '{code}' already exists")));
            }
            let (kind, value) = input.discount.parts();
            let changed = conn.execute(
                "UPDATE coupons SET code = ?2, code_key = ?3, description = ?4, discount_kind = ?5, discount_value = ?6,
                    max_uses = ?7, valid_until = ?8, active = ?9
                 WHERE id = ?1",
                params![
                    id,
                    code,
                    code_key(&code),
                    clean(input.description),
                    kind,
                    value,
                    input.max_uses,
                    input.valid_until,
                    input.active
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("coupon", id));
            }
        }
        self.get_coupon(id)
    }

    pub fn delete_coupon(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM coupons WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("coupon", id));
        }
        Ok(())
    }

    pub fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let conn = self.conn()?;
        find_by_code(&conn, code)
    }

    pub fn evaluate_coupon(
        &self,
        code: &str,
        amount_cents: i64,
        at: DateTime<Utc>,
    ) -> Result<Result<CouponEvaluation, CouponRejection>, StoreError> {
        check_amount(amount_cents, "amount_cents")?;
        let conn = self.conn()?;
        evaluate(&conn, code, amount_cents, at)
    }

    /// Count one use of a coupon outside of a payment.
    pub fn redeem_coupon(&self, code: &str, at: DateTime<Utc>) -> Result<Coupon, StoreError> {
        let id = {
            let mut conn = self.conn()?;
            let tx = conn.transaction()?;
            let evaluation = evaluate(&tx, code, 0, at)?
                .map_err(|rejection| StoreError::Invalid(rejection.message().to_string()))?;
            redeem(&tx, &evaluation.coupon.id)?;
            tx.commit()?;
            evaluation.coupon.id
        };
        self.get_coupon(&id)
    }

    /// Coupons a client could use right now, for the weekly promotion.
    pub fn active_promotions(&self, at: DateTime<Utc>) -> Result<Vec<Coupon>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons
             WHERE active = 1 AND (valid_until IS NULL OR valid_until >= ?1)
               AND (max_uses IS NULL OR uses < max_uses)
             ORDER BY created_at ASC"
        ))?;
        let coupons = stmt
            .query_map(params![at], coupon_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(coupons)
    }
}
