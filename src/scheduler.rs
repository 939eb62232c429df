//! Cron jobs: next-day appointment reminders and the weekly promotion.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::bot::whatsapp::{Messenger, normalize_phone};
use crate::config::{Config, StudioInfo};
use crate::store::{Appointment, Coupon, Database, StoreError};

/// Validate cron expression.
pub fn validate_cron(expr: &str) -> Result<(), String> {
    Schedule::from_str(expr)
        .map(|_| ())
        .map_err(|e| format!("Invalid cron: {}", e))
}

/// Next fire time of `expr` after `after`, with fields read in `tz`.
pub fn next_cron_trigger(expr: &str, after: DateTime<Utc>, tz: Tz) -> Result<DateTime<Utc>, String> {
    let schedule = Schedule::from_str(expr).map_err(|e| format!("Invalid cron: {}", e))?;
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| "No future occurrence for cron".to_string())
}

pub fn local_midnight(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// `[start, end)` of the studio-local day after `now`.
pub fn tomorrow_window(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let tomorrow = now.with_timezone(&tz).date_naive() + Duration::days(1);
    (local_midnight(tomorrow, tz), local_midnight(tomorrow + Duration::days(1), tz))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    DailyReminders,
    WeeklyPromotion,
}

impl Job {
    pub fn name(self) -> &'static str {
        match self {
            Self::DailyReminders => "daily_reminders",
            Self::WeeklyPromotion => "weekly_promotion",
        }
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: Job,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Recipients without a usable phone number.
    pub skipped: usize,
}

impl JobReport {
    fn new(job: Job) -> Self {
        Self { job, attempted: 0, sent: 0, failed: 0, skipped: 0 }
    }
}

fn reminder_text(appointment: &Appointment, studio: &StudioInfo, tz: Tz) -> String {
    let first_name = appointment
        .client_name
        .split_whitespace()
        .next()
        .unwrap_or(&appointment.client_name);
    let local = appointment.starts_at.with_timezone(&tz);
    format!(
        "Olá, {first_name}! Passando para lembrar da sua sessão de tatuagem no {} amanhã, {}, às {}.\n\
         Endereço: {}\nSe precisar remarcar, é só responder esta mensagem.",
        studio.name,
        local.format("%d/%m"),
        local.format("%H:%M"),
        studio.address
    )
}

fn promotion_text(first_name: &str, coupons: &[Coupon], studio: &StudioInfo, tz: Tz) -> String {
    let lines: Vec<String> = coupons
        .iter()
        .map(|c| {
            let mut line = format!("• Cupom {}: {} de desconto", c.code, c.discount.label());
            if let Some(until) = c.valid_until {
                line.push_str(&format!(" (válido até {})", until.with_timezone(&tz).format("%d/%m")));
            }
            line
        })
        .collect();
    format!(
        "Olá, {first_name}! Promoção da semana no {}:\n{}\n\nResponda esta mensagem para agendar sua próxima tattoo!",
        studio.name,
        lines.join("\n")
    )
}

pub struct Scheduler {
    db: Arc<Database>,
    messenger: Arc<dyn Messenger>,
    studio: StudioInfo,
    timezone: Tz,
    daily_reminder_cron: String,
    weekly_promotion_cron: String,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, messenger: Arc<dyn Messenger>, config: &Config) -> Self {
        Self {
            db,
            messenger,
            studio: config.studio.clone(),
            timezone: config.timezone,
            daily_reminder_cron: config.scheduler.daily_reminder_cron.clone(),
            weekly_promotion_cron: config.scheduler.weekly_promotion_cron.clone(),
        }
    }

    pub fn cron_for(&self, job: Job) -> &str {
        match job {
            Job::DailyReminders => &self.daily_reminder_cron,
            Job::WeeklyPromotion => &self.weekly_promotion_cron,
        }
    }

    pub fn next_run(&self, job: Job, after: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
        next_cron_trigger(self.cron_for(job), after, self.timezone)
    }

    pub async fn run(&self, job: Job, now: DateTime<Utc>) -> Result<JobReport, StoreError> {
        let report = match job {
            Job::DailyReminders => self.send_daily_reminders(now).await?,
            Job::WeeklyPromotion => self.send_weekly_promotion(now).await?,
        };
        info!(
            "⏰ {}: {} attempted, {} sent, {} failed, {} skipped",
            job.name(),
            report.attempted,
            report.sent,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    /// Remind every client with an appointment tomorrow. Reminders are only
    /// marked as sent when a live messenger delivered them.
    pub async fn send_daily_reminders(&self, now: DateTime<Utc>) -> Result<JobReport, StoreError> {
        let (from, to) = tomorrow_window(now, self.timezone);
        let targets = self.db.appointments_needing_reminder(from, to)?;
        let mut report = JobReport::new(Job::DailyReminders);

        for target in targets {
            let appointment = &target.appointment;
            let Some(phone) = target.phone.as_deref().and_then(normalize_phone) else {
                warn!("No WhatsApp number for {} (appointment {})", appointment.client_name, appointment.id);
                report.skipped += 1;
                continue;
            };
            report.attempted += 1;
            let text = reminder_text(appointment, &self.studio, self.timezone);
            match self.messenger.send_text(&phone, &text).await {
                Ok(_) => {
                    report.sent += 1;
                    info!("📅 Reminder sent to {} ({})", appointment.client_name, phone);
                    if self.messenger.is_live() {
                        self.db.mark_reminder_sent(&appointment.id, now)?;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to send reminder to {} ({}): {}", appointment.client_name, phone, e);
                }
            }
        }
        Ok(report)
    }

    /// Announce the active coupons to every client with a phone.
    pub async fn send_weekly_promotion(&self, now: DateTime<Utc>) -> Result<JobReport, StoreError> {
        let mut report = JobReport::new(Job::WeeklyPromotion);
        let coupons = self.db.active_promotions(now)?;
        if coupons.is_empty() {
            info!("No active coupons, skipping weekly promotion");
            return Ok(report);
        }

        for client in self.db.clients_with_phone()? {
            let Some(phone) = client.phone.as_deref().and_then(normalize_phone) else {
                report.skipped += 1;
                continue;
            };
            report.attempted += 1;
            let text = promotion_text(client.first_name(), &coupons, &self.studio, self.timezone);
            match self.messenger.send_text(&phone, &text).await {
                Ok(_) => {
                    report.sent += 1;
                    info!("📣 Promotion sent to {} ({})", client.name, phone);
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to send promotion to {} ({}): {}", client.name, phone, e);
                }
            }
        }
        Ok(report)
    }

    /// One loop per job: sleep until the next fire time, run, repeat.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        [Job::DailyReminders, Job::WeeklyPromotion]
            .into_iter()
            .map(|job| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.job_loop(job).await })
            })
            .collect()
    }

    async fn job_loop(&self, job: Job) {
        loop {
            let now = Utc::now();
            let next = match self.next_run(job, now) {
                Ok(next) => next,
                Err(e) => {
                    error!("Stopping {}: {}", job.name(), e);
                    return;
                }
            };
            info!("Next {} run at {}", job.name(), next.with_timezone(&self.timezone));
            let wait = (next - now).to_std().unwrap_or(StdDuration::ZERO);
            tokio::time::sleep(wait).await;

            if let Err(e) = self.run(job, Utc::now()).await {
                error!("{} failed: {}", job.name(), e);
            }
        }
    }
}
