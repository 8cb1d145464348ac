//! Protocol SLA record and its transitions
//!
//! ```text
//!            pause            complete
//!   RUNNING ───────▶ PAUSED ──────────▶ COMPLETED
//!      ▲    ◀───────   │                    ▲
//!      │     resume    │                    │
//!      └───────────────┴────── complete ────┘
//! ```
//!
//! Transitions here are pure: they take `now` and the actor and mutate the
//! record in place, or fail without touching it. Persistence and retries
//! live in [`crate::engine`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use civic_core::{EngineError, EngineResult, RequestContext};
use civic_registry::WorkflowDefinition;

/// What happened to an SLA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaAction {
    Started,
    Paused,
    Resumed,
    Advanced,
    Reassigned,
    Completed,
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaEvent {
    pub at: DateTime<Utc>,
    pub action: SlaAction,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Deadline tracking of one protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSla {
    pub id: String,
    pub protocol_id: String,
    pub service_id: String,

    /// Workflow version captured at start
    pub workflow_id: String,
    pub workflow_version: u32,
    pub workflow_digest: String,

    /// Index into the workflow stages
    pub current_stage: usize,

    #[serde(default)]
    pub assignee: Option<String>,

    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_reason: Option<String>,

    /// Time spent paused over all completed pauses
    #[serde(default)]
    pub total_paused_seconds: i64,

    /// Overdue as of the last transition; status reads recompute it
    #[serde(default)]
    pub is_overdue: bool,

    #[serde(default)]
    pub history: Vec<SlaEvent>,
}

impl ProtocolSla {
    /// A running SLA on the first stage of `workflow`
    pub fn start(
        protocol_id: impl Into<String>,
        service_id: impl Into<String>,
        workflow: &WorkflowDefinition,
        start_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Self {
        let mut sla = Self {
            id: civic_core::new_id(),
            protocol_id: protocol_id.into(),
            service_id: service_id.into(),
            workflow_id: workflow.id.clone(),
            workflow_version: workflow.version,
            workflow_digest: workflow.digest.clone(),
            current_stage: 0,
            assignee: None,
            start_date,
            due_date: due_date.max(start_date),
            completed_at: None,
            is_paused: false,
            paused_at: None,
            paused_reason: None,
            total_paused_seconds: 0,
            is_overdue: false,
            history: Vec::new(),
        };
        let note = workflow.stage(0).map(|s| s.name.clone());
        sla.record(start_date, SlaAction::Started, ctx, note);
        sla
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn total_paused(&self) -> Duration {
        Duration::seconds(self.total_paused_seconds)
    }

    /// Stop the clock. Returns `false` when already paused.
    pub fn pause(
        &mut self,
        reason: &str,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> EngineResult<bool> {
        self.ensure_open("pause")?;
        if self.is_paused {
            return Ok(false);
        }
        self.is_paused = true;
        self.paused_at = Some(now);
        self.paused_reason = Some(reason.to_string()).filter(|r| !r.is_empty());
        self.record(now, SlaAction::Paused, ctx, self.paused_reason.clone());
        Ok(true)
    }

    /// Restart the clock, pushing the due date by the paused time. Returns
    /// `false` when not paused.
    pub fn resume(&mut self, now: DateTime<Utc>, ctx: &RequestContext) -> EngineResult<bool> {
        self.ensure_open("resume")?;
        if !self.is_paused {
            return Ok(false);
        }
        self.close_pause(now);
        self.record(now, SlaAction::Resumed, ctx, None);
        Ok(true)
    }

    /// Close the SLA. A pause in progress ends here.
    pub fn complete(&mut self, now: DateTime<Utc>, ctx: &RequestContext) -> EngineResult<bool> {
        self.ensure_open("complete")?;
        if self.is_paused {
            self.close_pause(now);
        }
        self.completed_at = Some(now);
        self.record(now, SlaAction::Completed, ctx, None);
        Ok(true)
    }

    /// Move to the next stage of `workflow`; past the last stage the SLA
    /// completes.
    pub fn advance(
        &mut self,
        workflow: &WorkflowDefinition,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> EngineResult<bool> {
        self.ensure_open("advance")?;
        if self.is_paused {
            return Err(EngineError::InvalidTransition(format!(
                "SLA {} is paused; resume it before advancing",
                self.id
            )));
        }
        if workflow.id != self.workflow_id || workflow.digest != self.workflow_digest {
            return Err(EngineError::WorkflowVersionConflict {
                workflow_id: self.workflow_id.clone(),
                detail: format!(
                    "SLA {} started on version {} ({}), got {} ({})",
                    self.id, self.workflow_version, self.workflow_digest, workflow.version, workflow.digest
                ),
            });
        }
        let stage = workflow.stage(self.current_stage).ok_or_else(|| {
            EngineError::InvalidTransition(format!(
                "SLA {} points at stage {} of a {}-stage workflow",
                self.id,
                self.current_stage,
                workflow.stages.len()
            ))
        })?;
        if !stage.allows(&ctx.role) {
            return Err(EngineError::StageForbidden {
                role: ctx.role.clone(),
                stage: stage.name.clone(),
            });
        }

        let finished = stage.name.clone();
        self.current_stage += 1;
        match workflow.stage(self.current_stage) {
            Some(next) => {
                let note = format!("{} -> {}", finished, next.name);
                self.record(now, SlaAction::Advanced, ctx, Some(note));
            }
            None => {
                self.record(now, SlaAction::Advanced, ctx, Some(finished));
                self.completed_at = Some(now);
                self.record(now, SlaAction::Completed, ctx, None);
            }
        }
        Ok(true)
    }

    /// Hand the protocol to another staff member
    pub fn reassign(
        &mut self,
        assignee: &str,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> EngineResult<bool> {
        self.ensure_open("reassign")?;
        if self.assignee.as_deref() == Some(assignee) {
            return Ok(false);
        }
        let note = match &self.assignee {
            Some(previous) => format!("{} -> {}", previous, assignee),
            None => assignee.to_string(),
        };
        self.assignee = Some(assignee.to_string());
        self.record(now, SlaAction::Reassigned, ctx, Some(note));
        Ok(true)
    }

    fn ensure_open(&self, operation: &'static str) -> EngineResult<()> {
        if self.is_completed() {
            return Err(EngineError::TerminalStateViolation {
                sla_id: self.id.clone(),
                operation,
            });
        }
        Ok(())
    }

    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            let paused = (now - paused_at).max(Duration::zero());
            self.due_date += paused;
            self.total_paused_seconds += paused.num_seconds();
        }
        self.is_paused = false;
        self.paused_reason = None;
    }

    fn record(&mut self, at: DateTime<Utc>, action: SlaAction, ctx: &RequestContext, note: Option<String>) {
        self.is_overdue = crate::status::is_overdue(self, at);
        self.history.push(SlaEvent {
            at,
            action,
            actor: ctx.actor.clone(),
            note,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use civic_registry::Stage;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn workflow() -> WorkflowDefinition {
        let mut w = WorkflowDefinition::new(
            "CADASTRO_PRODUTOR",
            "Cadastro",
            vec![
                Stage::new("Análise Documental", 3).with_roles(["ATENDENTE"]),
                Stage::new("Vistoria", 7),
            ],
        );
        w.id = "wf-cadastro".to_string();
        w.version = 1;
        w
    }

    fn sla() -> ProtocolSla {
        ProtocolSla::start("p-1", "s-1", &workflow(), t(10, 9), t(20, 9), &RequestContext::system())
    }

    fn staff(role: &str) -> RequestContext {
        RequestContext::new("ana", role)
    }

    #[test]
    fn test_pause_resume_shifts_due_date() {
        let mut sla = sla();
        assert!(sla.pause("aguardando documentos", t(11, 9), &staff("ATENDENTE")).unwrap());
        assert!(sla.resume(t(13, 21), &staff("ATENDENTE")).unwrap());
        assert_eq!(sla.due_date, t(20, 9) + Duration::hours(60));
        assert_eq!(sla.total_paused_seconds, 60 * 60 * 60);
        assert!(sla.paused_at.is_none());
        assert_eq!(sla.history.len(), 3);
    }

    #[test]
    fn test_repeat_pause_and_resume_are_noops() {
        let mut sla = sla();
        assert!(!sla.resume(t(11, 9), &staff("X")).unwrap());
        sla.pause("", t(11, 9), &staff("X")).unwrap();
        assert!(sla.paused_reason.is_none());
        assert!(!sla.pause("de novo", t(12, 9), &staff("X")).unwrap());
        assert_eq!(sla.paused_at, Some(t(11, 9)));
        assert_eq!(sla.history.len(), 2);
    }

    #[test]
    fn test_completed_sla_rejects_everything() {
        let mut sla = sla();
        sla.complete(t(12, 9), &staff("X")).unwrap();
        let before = sla.clone();

        for err in [
            sla.complete(t(13, 9), &staff("X")).unwrap_err(),
            sla.pause("x", t(13, 9), &staff("X")).unwrap_err(),
            sla.resume(t(13, 9), &staff("X")).unwrap_err(),
            sla.advance(&workflow(), t(13, 9), &staff("ATENDENTE")).unwrap_err(),
            sla.reassign("bia", t(13, 9), &staff("X")).unwrap_err(),
        ] {
            assert!(matches!(err, EngineError::TerminalStateViolation { .. }));
        }
        assert_eq!(sla, before);
    }

    #[test]
    fn test_complete_while_paused_closes_pause() {
        let mut sla = sla();
        sla.pause("x", t(11, 9), &staff("X")).unwrap();
        sla.complete(t(12, 9), &staff("X")).unwrap();
        assert!(!sla.is_paused);
        assert_eq!(sla.total_paused_seconds, 86_400);
        assert_eq!(sla.due_date, t(21, 9));
    }

    #[test]
    fn test_advance_checks_role_and_completes_at_end() {
        let mut sla = sla();
        let workflow = workflow();
        let err = sla.advance(&workflow, t(11, 9), &staff("TECNICO")).unwrap_err();
        assert!(matches!(err, EngineError::StageForbidden { .. }));
        assert_eq!(sla.current_stage, 0);

        sla.advance(&workflow, t(11, 9), &staff("ATENDENTE")).unwrap();
        assert_eq!(sla.current_stage, 1);
        assert!(!sla.is_completed());

        sla.advance(&workflow, t(15, 9), &staff("TECNICO")).unwrap();
        assert_eq!(sla.completed_at, Some(t(15, 9)));
        assert_eq!(sla.history.last().unwrap().action, SlaAction::Completed);
    }

    #[test]
    fn test_advance_while_paused() {
        let mut sla = sla();
        sla.pause("x", t(11, 9), &staff("X")).unwrap();
        let err = sla.advance(&workflow(), t(11, 10), &staff("ATENDENTE")).unwrap_err();
        assert_eq!(err.code(), "SLA/INVALID_TRANSITION");
    }

    #[test]
    fn test_advance_on_changed_workflow() {
        let mut sla = sla();
        let mut changed = workflow();
        changed.stages[0].default_duration_days = 1;
        changed.digest = civic_registry::stage_digest(&changed.stages);
        changed.id = sla.workflow_id.clone();
        let err = sla.advance(&changed, t(11, 9), &staff("ATENDENTE")).unwrap_err();
        assert!(matches!(err, EngineError::WorkflowVersionConflict { .. }));
    }

    #[test]
    fn test_reassign() {
        let mut sla = sla();
        assert!(sla.reassign("ana", t(11, 9), &staff("COORDENADOR")).unwrap());
        assert!(!sla.reassign("ana", t(11, 9), &staff("COORDENADOR")).unwrap());
        sla.reassign("bia", t(12, 9), &staff("COORDENADOR")).unwrap();
        assert_eq!(sla.history.last().unwrap().note.as_deref(), Some("ana -> bia"));
    }

    #[test]
    fn test_overdue_flag_refreshed_on_transition() {
        let mut sla = sla();
        assert!(!sla.is_overdue);
        sla.reassign("ana", t(21, 9), &staff("X")).unwrap();
        assert!(sla.is_overdue);
    }
}
