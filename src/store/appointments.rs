//! Appointments (tattoo sessions) and the reminder bookkeeping.

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Database, StoreError, check_amount, clean, new_id, now};

/// Longest bookable session: one full day.
pub const MAX_DURATION_MINUTES: i64 = 24 * 60;

/// `starts_at + minutes`, or `None` if that isn't a representable instant.
fn end_of(starts_at: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    starts_at.checked_add_signed(TimeDelta::try_minutes(minutes)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "confirmed" => Self::Confirmed,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "no_show" => Self::NoShow,
            _ => Self::Scheduled,
        }
    }

    /// Whether the slot is still taken on the calendar.
    pub fn occupies_slot(self) -> bool {
        !matches!(self, Self::Cancelled | Self::NoShow)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub client_id: String,
    pub client_name: String,
    pub artist: Option<String>,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub price_cents: Option<i64>,
    pub deposit_cents: i64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn ends_at(&self) -> DateTime<Utc> {
        end_of(self.starts_at, self.duration_minutes).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub client_id: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub deposit_cents: i64,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AppointmentInput {
    /// Checks the input and returns when the appointment ends.
    fn validate(&self) -> Result<DateTime<Utc>, StoreError> {
        if self.duration_minutes <= 0 {
            return Err(StoreError::Invalid("duration_minutes must be positive".into()));
        }
        if self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(StoreError::Invalid(format!(
                "duration_minutes can't exceed {MAX_DURATION_MINUTES}"
            )));
        }
        check_amount(self.deposit_cents, "deposit_cents")?;
        if let Some(price) = self.price_cents {
            check_amount(price, "price_cents")?;
            if self.deposit_cents > price {
                return Err(StoreError::Invalid("deposit exceeds price".into()));
            }
        }
        end_of(self.starts_at, self.duration_minutes)
            .ok_or_else(|| StoreError::Invalid("starts_at is out of range".into()))
    }
}

/// Optional filters for listing appointments. `from` is inclusive, `to` exclusive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub client_id: Option<String>,
}

/// An appointment due for a reminder, with the client's phone if known.
#[derive(Debug, Clone)]
pub struct ReminderTarget {
    pub appointment: Appointment,
    pub phone: Option<String>,
}

const APPOINTMENT_COLUMNS: &str = "a.id, a.client_id, a.client_name, a.artist, a.description, a.starts_at, a.duration_minutes, \
     a.price_cents, a.deposit_cents, a.status, a.notes, a.reminder_sent_at, a.created_at, a.updated_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        client_id: row.get(1)?,
        client_name: row.get(2)?,
        artist: row.get(3)?,
        description: row.get(4)?,
        starts_at: row.get(5)?,
        duration_minutes: row.get(6)?,
        price_cents: row.get(7)?,
        deposit_cents: row.get(8)?,
        status: AppointmentStatus::from_db(&row.get::<_, String>(9)?),
        notes: row.get(10)?,
        reminder_sent_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Reject the slot if it overlaps another active appointment of the same artist.
fn check_overlap(
    conn: &Connection,
    exclude_id: &str,
    artist: Option<&str>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let clash: Option<(String, String)> = conn
        .query_row(
            "SELECT id, client_name FROM appointments
             WHERE id != ?1 AND artist IS ?2 AND status NOT IN ('cancelled', 'no_show')
               AND starts_at < ?3 AND ends_at > ?4
             LIMIT 1",
            params![exclude_id, artist, ends_at, starts_at],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match clash {
        Some((id, client_name)) => Err(StoreError::Conflict(format!(
            "time slot overlaps appointment {id} ({client_name})"
        ))),
        None => Ok(()),
    }
}

fn client_name(conn: &Connection, client_id: &str) -> Result<String, StoreError> {
    conn.query_row("SELECT name FROM clients WHERE id = ?1", params![client_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| StoreError::Invalid(format!("client '{client_id}' does not exist")))
}

impl Database {
    pub fn create_appointment(&self, input: AppointmentInput) -> Result<Appointment, StoreError> {
        let ends_at = input.validate()?;
        let conn = self.conn()?;
        let client_name = client_name(&conn, &input.client_id)?;
        let status = input.status.unwrap_or(AppointmentStatus::Scheduled);
        let ts = now();
        let appointment = Appointment {
            id: new_id(),
            client_id: input.client_id,
            client_name,
            artist: clean(input.artist),
            description: input.description.trim().to_string(),
            starts_at: input.starts_at,
            duration_minutes: input.duration_minutes,
            price_cents: input.price_cents,
            deposit_cents: input.deposit_cents,
            status,
            notes: clean(input.notes),
            reminder_sent_at: None,
            created_at: ts,
            updated_at: ts,
        };

        if status.occupies_slot() {
            check_overlap(
                &conn,
                &appointment.id,
                appointment.artist.as_deref(),
                appointment.starts_at,
                ends_at,
            )?;
        }

        conn.execute(
            "INSERT INTO appointments (id, client_id, client_name, artist, description, starts_at, ends_at, duration_minutes,
                price_cents, deposit_cents, status, notes, reminder_sent_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, ?14)",
            params![
                appointment.id,
                appointment.client_id,
                appointment.client_name,
                appointment.artist,
                appointment.description,
                appointment.starts_at,
                ends_at,
                appointment.duration_minutes,
                appointment.price_cents,
                appointment.deposit_cents,
                appointment.status.as_str(),
                appointment.notes,
                appointment.created_at,
                appointment.updated_at
            ],
        )?;
        info!(
            "Scheduled appointment {} for {} at {}",
            appointment.id, appointment.client_name, appointment.starts_at
        );
        Ok(appointment)
    }

    pub fn get_appointment(&self, id: &str) -> Result<Appointment, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?1"),
            params![id],
            appointment_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("appointment", id))
    }

    pub fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a
             WHERE (?1 IS NULL OR a.starts_at >= ?1)
               AND (?2 IS NULL OR a.starts_at < ?2)
               AND (?3 IS NULL OR a.status = ?3)
               AND (?4 IS NULL OR a.client_id = ?4)
             ORDER BY a.starts_at ASC"
        ))?;
        let appointments = stmt
            .query_map(
                params![
                    filter.from,
                    filter.to,
                    filter.status.map(AppointmentStatus::as_str),
                    filter.client_id
                ],
                appointment_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appointments)
    }

    pub fn update_appointment(&self, id: &str, input: AppointmentInput) -> Result<Appointment, StoreError> {
        let ends_at = input.validate()?;
        let current = self.get_appointment(id)?;
        let conn = self.conn()?;
        let client_name = client_name(&conn, &input.client_id)?;
        let status = input.status.unwrap_or(current.status);
        let artist = clean(input.artist);

        if status.occupies_slot() {
            check_overlap(&conn, id, artist.as_deref(), input.starts_at, ends_at)?;
        }

        // A moved appointment needs a fresh reminder
        let reminder_sent_at = if input.starts_at == current.starts_at {
            current.reminder_sent_at
        } else {
            None
        };

        conn.execute(
            "UPDATE appointments SET client_id = ?2, client_name = ?3, artist = ?4, description = ?5, starts_at = ?6,
                ends_at = ?7, duration_minutes = ?8, price_cents = ?9, deposit_cents = ?10, status = ?11, notes = ?12,
                reminder_sent_at = ?13, updated_at = ?14
             WHERE id = ?1",
            params![
                id,
                input.client_id,
                client_name,
                artist,
                input.description.trim(),
                input.starts_at,
                ends_at,
                input.duration_minutes,
                input.price_cents,
                input.deposit_cents,
                status.as_str(),
                clean(input.notes),
                reminder_sent_at,
                now()
            ],
        )?;
        drop(conn);
        self.get_appointment(id)
    }

    pub fn set_appointment_status(&self, id: &str, status: AppointmentStatus) -> Result<Appointment, StoreError> {
        let current = self.get_appointment(id)?;
        {
            let conn = self.conn()?;
            if status.occupies_slot() && !current.status.occupies_slot() {
                check_overlap(&conn, id, current.artist.as_deref(), current.starts_at, current.ends_at())?;
            }
            conn.execute(
                "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), now()],
            )?;
        }
        info!("Appointment {} is now {}", id, status.as_str());
        self.get_appointment(id)
    }

    pub fn delete_appointment(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM appointments WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::not_found("appointment", id));
        }
        Ok(())
    }

    /// Active appointments starting in `[from, to)` that haven't been reminded yet.
    pub fn appointments_needing_reminder(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReminderTarget>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS}, c.phone FROM appointments a
             LEFT JOIN clients c ON c.id = a.client_id
             WHERE a.status IN ('scheduled', 'confirmed') AND a.reminder_sent_at IS NULL
               AND a.starts_at >= ?1 AND a.starts_at < ?2
             ORDER BY a.starts_at ASC"
        ))?;
        let targets = stmt
            .query_map(params![from, to], |row| {
                Ok(ReminderTarget {
                    appointment: appointment_from_row(row)?,
                    phone: row.get(14)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    pub fn mark_reminder_sent(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE appointments SET reminder_sent_at = ?2 WHERE id = ?1",
            params![id, at],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("appointment", id));
        }
        Ok(())
    }
}
