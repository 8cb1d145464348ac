//! SLA status, computed on read
//!
//! Nothing runs in the background: every status is derived from the stored
//! record and the current time. Progress measures the working window only,
//! so paused time never counts:
//!
//! ```text
//! progress = (now - start - paused) / (due - start - paused) * 100
//! ```
//!
//! While paused, `now` is frozen at `pausedAt`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sla::ProtocolSla;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaStatus {
    WithinSla,
    NearDue,
    Overdue,
    Paused,
    Completed,
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SlaStatus::WithinSla => "WITHIN_SLA",
            SlaStatus::NearDue => "NEAR_DUE",
            SlaStatus::Overdue => "OVERDUE",
            SlaStatus::Paused => "PAUSED",
            SlaStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", name)
    }
}

/// The instant the SLA clock reads: completion, pause start, or `now`
fn reference_time(sla: &ProtocolSla, now: DateTime<Utc>) -> DateTime<Utc> {
    match (sla.completed_at, sla.paused_at) {
        (Some(done), _) => done,
        (None, Some(paused)) if sla.is_paused => paused,
        _ => now,
    }
}

/// Share of the working window used, 0 to 100
pub fn progress(sla: &ProtocolSla, now: DateTime<Utc>) -> f64 {
    if sla.is_completed() {
        return 100.0;
    }
    let window = (sla.due_date - sla.start_date - sla.total_paused()).num_seconds();
    if window <= 0 {
        return 100.0;
    }
    let elapsed = (reference_time(sla, now) - sla.start_date - sla.total_paused()).num_seconds();
    (elapsed as f64 / window as f64 * 100.0).clamp(0.0, 100.0)
}

/// Whether the clock has reached the due date. Completed SLAs answer
/// whether they finished late.
pub fn is_overdue(sla: &ProtocolSla, now: DateTime<Utc>) -> bool {
    reference_time(sla, now) > sla.due_date || (!sla.is_completed() && progress(sla, now) >= 100.0)
}

/// Status by precedence: COMPLETED, PAUSED, OVERDUE, NEAR_DUE, WITHIN_SLA
pub fn status(sla: &ProtocolSla, now: DateTime<Utc>, near_due_percent: f64) -> SlaStatus {
    if sla.is_completed() {
        SlaStatus::Completed
    } else if sla.is_paused {
        SlaStatus::Paused
    } else if is_overdue(sla, now) {
        SlaStatus::Overdue
    } else if progress(sla, now) >= near_due_percent {
        SlaStatus::NearDue
    } else {
        SlaStatus::WithinSla
    }
}

/// Whole days until the due date, rounded up; negative when late
pub fn days_remaining(sla: &ProtocolSla, now: DateTime<Utc>) -> i64 {
    let left = (sla.due_date - reference_time(sla, now)).num_seconds() as f64;
    (left / 86_400.0).ceil() as i64
}

/// Short Portuguese description of the deadline
pub fn describe_remaining(sla: &ProtocolSla, now: DateTime<Utc>) -> String {
    if sla.is_completed() {
        return "Concluído".to_string();
    }
    if sla.is_paused {
        return "Pausado".to_string();
    }
    match days_remaining(sla, now) {
        days if days < 0 => format!("{} dias em atraso", -days),
        0 => "Vence hoje".to_string(),
        1 => "Vence amanhã".to_string(),
        days => format!("{} dias restantes", days),
    }
}

/// Everything a caller shows about an SLA at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaView {
    pub sla: ProtocolSla,
    pub status: SlaStatus,
    pub progress: f64,
    pub days_remaining: i64,
    pub remaining: String,
}

impl SlaView {
    pub fn at(sla: ProtocolSla, now: DateTime<Utc>, near_due_percent: f64) -> Self {
        let mut sla = sla;
        sla.is_overdue = is_overdue(&sla, now);
        Self {
            status: status(&sla, now, near_due_percent),
            progress: progress(&sla, now),
            days_remaining: days_remaining(&sla, now),
            remaining: describe_remaining(&sla, now),
            sla,
        }
    }
}
