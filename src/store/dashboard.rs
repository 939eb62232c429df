//! Headline numbers for the dashboard.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde::Serialize;

use super::{Database, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub clients: usize,
    /// Active appointments in the next 7 days.
    pub upcoming_appointments: usize,
    pub low_stock_items: usize,
    /// Net revenue since `month_start`.
    pub revenue_month_cents: i64,
}

impl Database {
    /// `month_start` is the first instant of the current month in the studio's time zone.
    pub fn dashboard_stats(&self, at: DateTime<Utc>, month_start: DateTime<Utc>) -> Result<DashboardStats, StoreError> {
        let clients = self.client_count()?;
        let low_stock_items = self.low_stock_count()?;
        let conn = self.conn()?;
        let upcoming: i64 = conn.query_row(
            "SELECT COUNT(*) FROM appointments
             WHERE status IN ('scheduled', 'confirmed') AND starts_at >= ?1 AND starts_at < ?2",
            params![at, at + Duration::days(7)],
            |row| row.get(0),
        )?;
        let revenue: i64 = conn.query_row(
            "SELECT COALESCE(SUM(amount_cents - discount_cents), 0) FROM payments WHERE paid_at >= ?1",
            params![month_start],
            |row| row.get(0),
        )?;
        Ok(DashboardStats {
            clients,
            upcoming_appointments: usize::try_from(upcoming).unwrap_or_default(),
            low_stock_items,
            revenue_month_cents: revenue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AppointmentInput, ClientInput, InventoryItemInput, PaymentInput, PaymentMethod};
    use chrono::TimeZone;

    #[test]
    fn test_stats() {
        let db = Database::new().unwrap();
        let now = Utc.with_ymd_and_hms(2030, 7, 15, 12, 0, 0).unwrap();
        let month_start = Utc.with_ymd_and_hms(2030, 7, 1, 3, 0, 0).unwrap();

        let client = db.create_client(ClientInput::named("Gabi")).unwrap();
        for days in [1, 3, 10] {
            db.create_appointment(AppointmentInput {
                client_id: client.id.clone(),
                artist: None,
                description: String::new(),
                starts_at: now + Duration::days(days),
                duration_minutes: 60,
                price_cents: None,
                deposit_cents: 0,
                status: None,
                notes: None,
            })
            .unwrap();
        }
        db.create_inventory_item(InventoryItemInput {
            name: "Luvas".to_string(),
            min_quantity: 5,
            quantity: 2,
            ..Default::default()
        })
        .unwrap();
        for (amount, day) in [(10_000, 2), (25_000, 10)] {
            db.record_payment(PaymentInput {
                client_id: None,
                appointment_id: None,
                amount_cents: amount,
                coupon_code: None,
                method: PaymentMethod::Pix,
                paid_at: Some(Utc.with_ymd_and_hms(2030, 7, day, 12, 0, 0).unwrap()),
                notes: None,
            })
            .unwrap();
        }
        // Previous month
        db.record_payment(PaymentInput {
            client_id: None,
            appointment_id: None,
            amount_cents: 99_000,
            coupon_code: None,
            method: PaymentMethod::Cash,
            paid_at: Some(Utc.with_ymd_and_hms(2030, 6, 30, 12, 0, 0).unwrap()),
            notes: None,
        })
        .unwrap();

        let stats = db.dashboard_stats(now, month_start).unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                clients: 1,
                upcoming_appointments: 2,
                low_stock_items: 1,
                revenue_month_cents: 35_000,
            }
        );
    }
}
