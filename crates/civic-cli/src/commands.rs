//! Subcommand implementations

use anyhow::{anyhow, bail, Context, Result};
use chrono::Duration;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;

use civic_core::{EngineConfig, ManualClock, MemoryStore, RequestContext};
use civic_registry::{
    load_catalog, load_workflows, plan_module_renames, ServiceCatalog, ServiceRegistry,
    WorkflowCatalog, WorkflowDefinition, WorkflowRegistry,
};
use civic_schema::{strip_identity_fields, MessageCatalog, ServiceDefinition, Validator};
use civic_workflow::{Protocol, ProtocolSla, SlaEngine};

/// Configuration and registries loaded from the catalog files
pub struct Env {
    pub config: EngineConfig,
    pub catalog: ServiceCatalog,
    pub services: Arc<ServiceRegistry>,
    pub workflows: Arc<WorkflowRegistry>,
    pub messages: Option<MessageCatalog>,
}

impl Env {
    pub fn load(
        config_path: &str,
        services_path: &str,
        workflows_path: &str,
        messages_path: Option<&str>,
    ) -> Result<Self> {
        let config = if Path::new(config_path).exists() {
            EngineConfig::load(config_path)?
        } else {
            tracing::warn!(path = config_path, "config file not found, using defaults");
            EngineConfig::default()
        };

        let catalog = ServiceCatalog::load(services_path)?;
        let services = Arc::new(ServiceRegistry::new(Arc::new(
            MemoryStore::<ServiceDefinition>::new(),
        ))?);
        let loaded = load_catalog(&services, catalog.clone(), true)?;
        tracing::info!(
            services = loaded.registered.len(),
            renamed = loaded.renames.len(),
            "service catalog loaded"
        );

        let workflows = Arc::new(WorkflowRegistry::new(Arc::new(
            MemoryStore::<WorkflowDefinition>::new(),
        )));
        load_workflows(&workflows, WorkflowCatalog::load(workflows_path)?.workflows)?;

        let messages = match messages_path {
            Some(path) => Some(
                MessageCatalog::load(path)
                    .with_context(|| format!("loading messages from {}", path))?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            catalog,
            services,
            workflows,
            messages,
        })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn validate(env: &Env, service_key: &str, payload_path: &str, as_json: bool) -> Result<()> {
    let service = env.services.resolve(service_key)?;
    let content = std::fs::read_to_string(payload_path)
        .with_context(|| format!("reading payload {}", payload_path))?;
    let payload: Value = serde_json::from_str(&content)
        .with_context(|| format!("parsing payload {}", payload_path))?;

    let catalog = env
        .messages
        .as_ref()
        .unwrap_or_else(|| MessageCatalog::default_catalog());
    match Validator::new(catalog).validate(&service, &payload) {
        Ok(valid) => {
            if as_json {
                print_json(&valid.into_value())
            } else {
                println!("{}: payload accepted", service.name);
                Ok(())
            }
        }
        Err(errors) => {
            if as_json {
                print_json(&errors)?;
            } else {
                println!("{}: payload rejected", service.name);
                for error in &errors {
                    println!("  {}", error);
                }
            }
            bail!("{} validation error(s)", errors.len())
        }
    }
}

pub fn services(env: &Env, department: Option<&str>, as_json: bool) -> Result<()> {
    let services = match department {
        Some(code) => env.services.list_by_department(code)?,
        None => env.services.list()?,
    };
    if as_json {
        return print_json(&services);
    }
    for s in services {
        println!(
            "{:<30} {:<36} {:<16} {:<28} {}",
            s.id,
            s.name,
            s.service_kind.to_string(),
            s.module_type.as_deref().unwrap_or("-"),
            s.priority
        );
    }
    Ok(())
}

pub fn workflows(env: &Env, as_json: bool) -> Result<()> {
    let workflows = env.workflows.list_active()?;
    if as_json {
        return print_json(&workflows);
    }
    for w in workflows {
        println!("{} v{}  {}  ({} dias)  {}", w.module, w.version, w.name, w.total_days(), w.digest);
        for (i, stage) in w.stages.iter().enumerate() {
            let roles = if stage.allowed_roles.is_empty() {
                "qualquer perfil".to_string()
            } else {
                stage.allowed_roles.join(", ")
            };
            println!("  {}. {} ({}d) [{}]", i + 1, stage.name, stage.default_duration_days, roles);
        }
    }
    Ok(())
}

pub fn remediate(env: &Env, as_json: bool) -> Result<()> {
    let renames = plan_module_renames(&env.catalog.services);
    let moves: Vec<(String, Vec<String>)> = env
        .catalog
        .services
        .iter()
        .cloned()
        .filter_map(|mut s| {
            let moved = strip_identity_fields(&mut s);
            (!moved.is_empty()).then(|| (s.id, moved))
        })
        .collect();

    if as_json {
        let moves: Map<String, Value> = moves.into_iter().map(|(id, fields)| (id, json!(fields))).collect();
        return print_json(&json!({ "renames": renames, "identityFields": moves }));
    }
    if renames.is_empty() && moves.is_empty() {
        println!("catalog is clean");
        return Ok(());
    }
    for r in &renames {
        println!("{} ({}): {} -> {}", r.service_id, r.service_name, r.from, r.to);
    }
    for (id, fields) in &moves {
        println!("{}: move {} to citizenFields", id, fields.join(", "));
    }
    Ok(())
}

pub fn sla(env: &Env, service_key: &str, paused_hours: i64, elapsed_hours: i64, as_json: bool) -> Result<()> {
    if paused_hours < 0 || elapsed_hours < 0 {
        bail!("hours cannot be negative");
    }
    if paused_hours > elapsed_hours {
        bail!("paused hours ({}) exceed elapsed hours ({})", paused_hours, elapsed_hours);
    }

    let service = env.services.resolve(service_key)?;
    let module = match service.module_type.as_deref() {
        Some(module) if service.is_data_collecting() => module.to_string(),
        _ => bail!("'{}' is informational and opens no protocol", service.name),
    };
    let workflow = env
        .workflows
        .find_active_by_module(&module)?
        .ok_or_else(|| anyhow!("no active workflow for module {}", module))?;

    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let engine = SlaEngine::new(
        Arc::new(MemoryStore::<ProtocolSla>::new()),
        env.workflows.clone(),
        clock.clone(),
        env.config.clone(),
    );
    let ctx = RequestContext::system();
    let protocol = Protocol::new(&service.id, "simulacao", Map::new(), Some(module), engine.now());
    let sla = engine.start(&protocol, &service, &workflow, &ctx)?;

    clock.advance(Duration::hours(elapsed_hours - paused_hours));
    if paused_hours > 0 {
        engine.pause(&sla.id, "simulação", &ctx)?;
        clock.advance(Duration::hours(paused_hours));
        engine.resume(&sla.id, &ctx)?;
    }
    let view = engine.view(&sla.id)?;

    if as_json {
        return print_json(&view);
    }
    println!("Service:   {} ({})", service.name, workflow.module);
    println!("Workflow:  {} v{}, {} dias", workflow.name, workflow.version, workflow.total_days());
    println!("Started:   {}", view.sla.start_date.format("%Y-%m-%d %H:%M"));
    println!("Due:       {}", view.sla.due_date.format("%Y-%m-%d %H:%M"));
    println!("Progress:  {:.1}%", view.progress);
    println!("Status:    {}", view.status);
    println!("Remaining: {}", view.remaining);
    Ok(())
}
