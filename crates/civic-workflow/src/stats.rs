//! SLA listings and aggregate figures

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::sla::ProtocolSla;
use crate::status::{status, SlaStatus};

/// Running SLAs whose clock has passed the due date. Paused SLAs are not
/// listed; their clock is stopped.
pub fn overdue(slas: &[ProtocolSla], now: DateTime<Utc>) -> Vec<ProtocolSla> {
    slas.iter()
        .filter(|s| !s.is_completed() && !s.is_paused && crate::status::is_overdue(s, now))
        .cloned()
        .collect()
}

/// Running SLAs due after `now` and no later than `within_days` days from it
pub fn near_due(slas: &[ProtocolSla], now: DateTime<Utc>, within_days: i64) -> Vec<ProtocolSla> {
    let horizon = now + Duration::days(within_days);
    let mut found: Vec<ProtocolSla> = slas
        .iter()
        .filter(|s| !s.is_completed() && !s.is_paused)
        .filter(|s| s.due_date > now && s.due_date <= horizon)
        .cloned()
        .collect();
    found.sort_by_key(|s| s.due_date);
    found
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaStats {
    pub total: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,

    /// Running SLAs with status OVERDUE
    pub overdue: usize,

    /// Running SLAs with status NEAR_DUE
    pub near_due: usize,

    pub completed_on_time: usize,

    /// Share of completed SLAs finished by their due date; 100 when none
    /// completed yet
    pub compliance_percent: f64,

    /// Mean wall-clock hours from start to completion
    pub average_completion_hours: f64,
}

impl SlaStats {
    pub fn compute(slas: &[ProtocolSla], now: DateTime<Utc>, near_due_percent: f64) -> Self {
        let mut stats = SlaStats {
            total: slas.len(),
            ..Default::default()
        };
        let mut completion_seconds = 0i64;

        for sla in slas {
            match status(sla, now, near_due_percent) {
                SlaStatus::Completed => {
                    stats.completed += 1;
                    if let Some(done) = sla.completed_at {
                        if done <= sla.due_date {
                            stats.completed_on_time += 1;
                        }
                        completion_seconds += (done - sla.start_date).num_seconds();
                    }
                }
                SlaStatus::Paused => stats.paused += 1,
                SlaStatus::Overdue => {
                    stats.running += 1;
                    stats.overdue += 1;
                }
                SlaStatus::NearDue => {
                    stats.running += 1;
                    stats.near_due += 1;
                }
                SlaStatus::WithinSla => stats.running += 1,
            }
        }

        stats.compliance_percent = if stats.completed == 0 {
            100.0
        } else {
            stats.completed_on_time as f64 / stats.completed as f64 * 100.0
        };
        if stats.completed > 0 {
            stats.average_completion_hours = completion_seconds as f64 / 3600.0 / stats.completed as f64;
        }
        stats
    }
}
