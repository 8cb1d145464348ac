//! Duplicate module type remediation
//!
//! Catalogs assembled before module uniqueness was enforced may bind several
//! active data-collecting services to one `moduleType`. Remediation keeps
//! the oldest binding and gives every later service a suffixed module type:
//!
//! ```text
//! ATENDIMENTOS_AGRICULTURA (2025-01-10) -> kept
//! ATENDIMENTOS_AGRICULTURA (2025-01-12) -> ATENDIMENTOS_AGRICULTURA_1
//! ATENDIMENTOS_AGRICULTURA (2025-01-12) -> ATENDIMENTOS_AGRICULTURA_2
//! ```
//!
//! The plan depends only on the input, so running it twice on the same
//! catalog renames the same services to the same names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use civic_schema::ServiceDefinition;

/// One module type change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRename {
    pub service_id: String,
    pub service_name: String,
    pub from: String,
    pub to: String,
}

/// Compute the renames without touching the definitions.
///
/// Services in one group are ordered by `createdAt`, ties broken by id.
/// Suffixes already used by any service are skipped.
pub fn plan_module_renames(services: &[ServiceDefinition]) -> Vec<ModuleRename> {
    let taken: HashSet<&str> = services
        .iter()
        .filter_map(|s| s.module_type.as_deref())
        .collect();

    let mut groups: BTreeMap<&str, Vec<&ServiceDefinition>> = BTreeMap::new();
    for service in services {
        if !(service.is_active && service.is_data_collecting()) {
            continue;
        }
        if let Some(module) = service.module_type.as_deref() {
            groups.entry(module).or_default().push(service);
        }
    }

    let mut fresh: HashSet<String> = HashSet::new();
    let mut renames = Vec::new();
    for (module, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut suffix = 1;
        for service in group.into_iter().skip(1) {
            let to = loop {
                let candidate = format!("{}_{}", module, suffix);
                suffix += 1;
                if !taken.contains(candidate.as_str()) && !fresh.contains(&candidate) {
                    break candidate;
                }
            };
            fresh.insert(to.clone());
            renames.push(ModuleRename {
                service_id: service.id.clone(),
                service_name: service.name.clone(),
                from: module.to_string(),
                to,
            });
        }
    }
    renames
}

/// Apply the rename plan to `services` and return it
pub fn remediate_duplicate_module_types(services: &mut [ServiceDefinition]) -> Vec<ModuleRename> {
    let renames = plan_module_renames(services);
    for rename in &renames {
        if let Some(service) = services.iter_mut().find(|s| s.id == rename.service_id) {
            tracing::warn!(
                service = %service.name,
                from = %rename.from,
                to = %rename.to,
                "duplicate module type renamed"
            );
            service.module_type = Some(rename.to.clone());
        }
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use civic_schema::ServiceKind;

    fn service(id: &str, module: &str, day: u32) -> ServiceDefinition {
        let mut s = ServiceDefinition::new(
            format!("Serviço {}", id),
            "AGRICULTURA",
            ServiceKind::DataCollecting,
            Some(module),
        );
        s.id = id.to_string();
        s.created_at = Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        s
    }

    #[test]
    fn test_oldest_kept() {
        let mut services = vec![
            service("c", "ATENDIMENTOS", 12),
            service("a", "ATENDIMENTOS", 10),
            service("b", "ATENDIMENTOS", 11),
        ];
        let renames = remediate_duplicate_module_types(&mut services);
        assert_eq!(renames.len(), 2);
        assert_eq!(services[1].module_type.as_deref(), Some("ATENDIMENTOS"));
        assert_eq!(services[2].module_type.as_deref(), Some("ATENDIMENTOS_1"));
        assert_eq!(services[0].module_type.as_deref(), Some("ATENDIMENTOS_2"));
    }

    #[test]
    fn test_ties_broken_by_id() {
        let services = vec![service("z", "M", 10), service("y", "M", 10)];
        let renames = plan_module_renames(&services);
        assert_eq!(renames[0].service_id, "z");
        assert_eq!(renames[0].to, "M_1");
    }

    #[test]
    fn test_taken_suffixes_skipped() {
        let services = vec![
            service("a", "M", 10),
            service("b", "M", 11),
            service("c", "M_1", 9),
        ];
        let renames = plan_module_renames(&services);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].to, "M_2");
    }

    #[test]
    fn test_inactive_and_informational_ignored() {
        let mut inactive = service("b", "M", 11);
        inactive.is_active = false;
        let services = vec![service("a", "M", 10), inactive];
        assert!(plan_module_renames(&services).is_empty());
    }

    #[test]
    fn test_plan_is_repeatable() {
        let services = vec![
            service("a", "M", 10),
            service("b", "M", 11),
            service("c", "N", 10),
            service("d", "N", 10),
        ];
        assert_eq!(plan_module_renames(&services), plan_module_renames(&services));
    }
}
