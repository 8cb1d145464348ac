//! SLA Engine: persisted transitions over a [`Store`]
//!
//! Every transition reads the record, applies the pure transition from
//! [`crate::sla`] to a copy and writes it back with a compare-and-swap on the
//! revision it read. A stale revision means another request got there first:
//! the engine re-reads and tries again, up to `maxConflictRetries` times.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use civic_core::{Clock, EngineConfig, EngineError, EngineResult, RequestContext, Store, StoreError};
use civic_registry::{WorkflowDefinition, WorkflowRegistry};
use civic_schema::{DeadlinePolicy, ServiceDefinition};

use crate::calendar;
use crate::protocol::Protocol;
use crate::sla::ProtocolSla;
use crate::stats::{self, SlaStats};
use crate::status::SlaView;

pub struct SlaEngine {
    store: Arc<dyn Store<ProtocolSla>>,
    workflows: Arc<WorkflowRegistry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl SlaEngine {
    pub fn new(
        store: Arc<dyn Store<ProtocolSla>>,
        workflows: Arc<WorkflowRegistry>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            workflows,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Due date of a protocol of `service` started at `start`
    pub fn due_date(
        &self,
        service: &ServiceDefinition,
        workflow: &WorkflowDefinition,
        start: DateTime<Utc>,
    ) -> EngineResult<DateTime<Utc>> {
        let days = match (service.deadline_policy, service.estimated_days) {
            (DeadlinePolicy::EstimatedDays, Some(days)) => days,
            _ => workflow.total_days(),
        };
        calendar::add_days(start, days, self.config.business_days)
    }

    /// Open the SLA of `protocol` on the first stage of `workflow`
    pub fn start(
        &self,
        protocol: &Protocol,
        service: &ServiceDefinition,
        workflow: &WorkflowDefinition,
        ctx: &RequestContext,
    ) -> EngineResult<ProtocolSla> {
        let now = self.now();
        let due = self.due_date(service, workflow, now)?;
        let sla = ProtocolSla::start(&protocol.id, &service.id, workflow, now, due, ctx);
        let stored = self.store.insert(&sla.id, &sla)?.value;
        tracing::info!(
            sla_id = %stored.id,
            protocol = %protocol.number,
            workflow = %workflow.id,
            version = workflow.version,
            due = %stored.due_date,
            "SLA started"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &str) -> EngineResult<ProtocolSla> {
        self.store
            .get(id)?
            .map(|v| v.value)
            .ok_or_else(|| EngineError::not_found("sla", id))
    }

    pub fn find_by_protocol(&self, protocol_id: &str) -> EngineResult<Option<ProtocolSla>> {
        Ok(self.list()?.into_iter().find(|s| s.protocol_id == protocol_id))
    }

    pub fn list(&self) -> EngineResult<Vec<ProtocolSla>> {
        Ok(self.store.list()?.into_iter().map(|v| v.value).collect())
    }

    pub fn pause(&self, id: &str, reason: &str, ctx: &RequestContext) -> EngineResult<ProtocolSla> {
        self.transition(id, "pause", ctx, |sla, now| sla.pause(reason, now, ctx))
    }

    pub fn resume(&self, id: &str, ctx: &RequestContext) -> EngineResult<ProtocolSla> {
        self.transition(id, "resume", ctx, |sla, now| sla.resume(now, ctx))
    }

    pub fn complete(&self, id: &str, ctx: &RequestContext) -> EngineResult<ProtocolSla> {
        self.transition(id, "complete", ctx, |sla, now| sla.complete(now, ctx))
    }

    /// Move to the next stage of the workflow version the SLA started on
    pub fn advance(&self, id: &str, ctx: &RequestContext) -> EngineResult<ProtocolSla> {
        let workflow = self.workflows.get(&self.get(id)?.workflow_id)?;
        self.transition(id, "advance", ctx, |sla, now| sla.advance(&workflow, now, ctx))
    }

    pub fn reassign(&self, id: &str, assignee: &str, ctx: &RequestContext) -> EngineResult<ProtocolSla> {
        self.transition(id, "reassign", ctx, |sla, now| sla.reassign(assignee, now, ctx))
    }

    /// Status, progress and remaining time as of now
    pub fn view(&self, id: &str) -> EngineResult<SlaView> {
        Ok(SlaView::at(self.get(id)?, self.now(), self.config.near_due_percent))
    }

    /// Open SLAs past their due date
    pub fn overdue(&self, now: DateTime<Utc>) -> EngineResult<Vec<ProtocolSla>> {
        Ok(stats::overdue(&self.list()?, now))
    }

    /// Running SLAs due within the next `within_days` days
    pub fn near_due(&self, now: DateTime<Utc>, within_days: i64) -> EngineResult<Vec<ProtocolSla>> {
        Ok(stats::near_due(&self.list()?, now, within_days))
    }

    pub fn stats(&self, now: DateTime<Utc>) -> EngineResult<SlaStats> {
        Ok(SlaStats::compute(&self.list()?, now, self.config.near_due_percent))
    }

    /// Read, apply `op` to a copy, compare-and-swap. An `op` that changes
    /// nothing returns the record as read without writing.
    fn transition<F>(
        &self,
        id: &str,
        operation: &'static str,
        ctx: &RequestContext,
        op: F,
    ) -> EngineResult<ProtocolSla>
    where
        F: Fn(&mut ProtocolSla, DateTime<Utc>) -> EngineResult<bool>,
    {
        let attempts = self.config.max_conflict_retries.max(1);
        for attempt in 1..=attempts {
            let current = self
                .store
                .get(id)?
                .ok_or_else(|| EngineError::not_found("sla", id))?;

            let mut next = current.value.clone();
            if !op(&mut next, self.now())? {
                tracing::debug!(sla_id = %id, operation, "SLA transition is a no-op");
                return Ok(current.value);
            }

            match self.store.update(id, current.revision, &next) {
                Ok(stored) => {
                    tracing::info!(
                        sla_id = %id,
                        operation,
                        actor = %ctx.actor,
                        trace_id = %ctx.trace_id,
                        stage = stored.value.current_stage,
                        due = %stored.value.due_date,
                        "SLA transition applied"
                    );
                    return Ok(stored.value);
                }
                Err(StoreError::Conflict { expected, actual, .. }) => {
                    tracing::warn!(
                        sla_id = %id,
                        operation,
                        attempt,
                        expected,
                        actual,
                        "stale SLA revision, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict {
            id: id.to_string(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use civic_core::{ManualClock, MemoryStore, Versioned};
    use civic_registry::Stage;
    use civic_schema::ServiceKind;
    use serde_json::Map;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn t0() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn fixture(config: EngineConfig) -> (SlaEngine, Arc<ManualClock>, WorkflowDefinition) {
        let workflows = Arc::new(WorkflowRegistry::new(Arc::new(MemoryStore::<WorkflowDefinition>::new())));
        let workflow = workflows
            .create(WorkflowDefinition::new(
                "CADASTRO_PRODUTOR",
                "Cadastro",
                vec![
                    Stage::new("Análise", 3).with_roles(["ATENDENTE"]),
                    Stage::new("Vistoria", 7).with_roles(["TECNICO"]),
                ],
            ))
            .unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = SlaEngine::new(
            Arc::new(MemoryStore::<ProtocolSla>::new()),
            workflows,
            clock.clone(),
            config,
        );
        (engine, clock, workflow)
    }

    fn service() -> ServiceDefinition {
        ServiceDefinition::new("Cadastro", "AGRICULTURA", ServiceKind::DataCollecting, Some("CADASTRO_PRODUTOR"))
    }

    fn protocol() -> Protocol {
        Protocol::new("svc", "cit", Map::new(), Some("CADASTRO_PRODUTOR".to_string()), t0())
    }

    #[test]
    fn test_due_date_policies() {
        let (engine, _, workflow) = fixture(EngineConfig::default());
        let mut service = service();
        assert_eq!(engine.due_date(&service, &workflow, t0()).unwrap(), t0() + Duration::days(10));

        service.estimated_days = Some(4);
        assert_eq!(engine.due_date(&service, &workflow, t0()).unwrap(), t0() + Duration::days(10));

        service.deadline_policy = DeadlinePolicy::EstimatedDays;
        assert_eq!(engine.due_date(&service, &workflow, t0()).unwrap(), t0() + Duration::days(4));
    }

    #[test]
    fn test_due_date_business_days() {
        let config = EngineConfig {
            business_days: true,
            ..EngineConfig::default()
        };
        let (engine, _, workflow) = fixture(config);
        // 10 business days from a Monday land two weeks later
        assert_eq!(engine.due_date(&service(), &workflow, t0()).unwrap(), t0() + Duration::days(14));
    }

    #[test]
    fn test_unbounded_estimate_starts_nothing() {
        let (engine, _, workflow) = fixture(EngineConfig::default());
        let mut service = service();
        service.deadline_policy = DeadlinePolicy::EstimatedDays;
        service.estimated_days = Some(u32::MAX);

        let err = engine
            .start(&protocol(), &service, &workflow, &RequestContext::system())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition(_)));
        assert!(engine.list().unwrap().is_empty());
    }

    #[test]
    fn test_transitions_are_persisted() {
        let (engine, clock, workflow) = fixture(EngineConfig::default());
        let sla = engine.start(&protocol(), &service(), &workflow, &RequestContext::system()).unwrap();

        clock.advance(Duration::days(1));
        engine.pause(&sla.id, "aguardando documentos", &RequestContext::new("ana", "ATENDENTE")).unwrap();
        clock.advance(Duration::days(2));
        let resumed = engine.resume(&sla.id, &RequestContext::new("ana", "ATENDENTE")).unwrap();

        assert_eq!(resumed.due_date, sla.due_date + Duration::days(2));
        assert_eq!(engine.get(&sla.id).unwrap(), resumed);
        assert_eq!(engine.find_by_protocol(&sla.protocol_id).unwrap(), Some(resumed));
    }

    #[test]
    fn test_advance_uses_started_version() {
        let (engine, clock, workflow) = fixture(EngineConfig::default());
        let sla = engine.start(&protocol(), &service(), &workflow, &RequestContext::system()).unwrap();
        engine.workflows.new_version(&workflow.id).unwrap();

        clock.advance(Duration::days(1));
        let advanced = engine.advance(&sla.id, &RequestContext::new("ana", "ATENDENTE")).unwrap();
        assert_eq!(advanced.current_stage, 1);
        assert_eq!(advanced.workflow_version, 1);

        let err = engine.advance(&sla.id, &RequestContext::new("ana", "ATENDENTE")).unwrap_err();
        assert_eq!(err.code(), "SLA/STAGE_FORBIDDEN");
    }

    #[test]
    fn test_missing_sla() {
        let (engine, _, _) = fixture(EngineConfig::default());
        let err = engine.pause("nope", "x", &RequestContext::system()).unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    /// A store whose updates always lose the race
    struct AlwaysStale {
        inner: MemoryStore<ProtocolSla>,
        updates: AtomicU32,
    }

    impl Store<ProtocolSla> for AlwaysStale {
        fn insert(&self, id: &str, value: &ProtocolSla) -> Result<Versioned<ProtocolSla>, StoreError> {
            self.inner.insert(id, value)
        }

        fn get(&self, id: &str) -> Result<Option<Versioned<ProtocolSla>>, StoreError> {
            self.inner.get(id)
        }

        fn list(&self) -> Result<Vec<Versioned<ProtocolSla>>, StoreError> {
            self.inner.list()
        }

        fn update(&self, id: &str, expected: u64, _: &ProtocolSla) -> Result<Versioned<ProtocolSla>, StoreError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict {
                id: id.to_string(),
                expected,
                actual: expected + 1,
            })
        }
    }

    #[test]
    fn test_conflict_after_retries() {
        let store = Arc::new(AlwaysStale {
            inner: MemoryStore::<ProtocolSla>::new(),
            updates: AtomicU32::new(0),
        });
        let workflows = Arc::new(WorkflowRegistry::new(Arc::new(MemoryStore::<WorkflowDefinition>::new())));
        let workflow = workflows
            .create(WorkflowDefinition::new("M", "W", vec![Stage::new("Única", 5)]))
            .unwrap();
        let engine = SlaEngine::new(
            store.clone(),
            workflows,
            Arc::new(ManualClock::new(t0())),
            EngineConfig::default(),
        );
        let sla = engine.start(&protocol(), &service(), &workflow, &RequestContext::system()).unwrap();

        let err = engine.pause(&sla.id, "x", &RequestContext::system()).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { attempts: 3, .. }));
        assert_eq!(store.updates.load(Ordering::SeqCst), 3);
        assert!(!engine.get(&sla.id).unwrap().is_paused);
    }
}
