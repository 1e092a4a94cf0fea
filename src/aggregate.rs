//! Cross-file merge of per-file facts into the final [`FactGraph`].
//!
//! Files are folded one at a time in lexicographic path order, so the
//! result does not depend on the order in which scans finished.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ConflictPolicy;
use crate::error::AggregateError;
use crate::extract::types::{
    AuthPolicy, FieldMap, FileFacts, ModelSchema, PayloadShape, RouteKey, ServiceCategory,
    Visibility,
};

/// Services split by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSets {
    pub business_services: Vec<String>,
    pub utility_services: Vec<String>,
}

/// Route keys split by visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSets {
    pub public_routes: Vec<String>,
    pub internal_routes: Vec<String>,
}

/// The merged, size-limited output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactGraph {
    pub services: ServiceSets,
    pub api_routes: RouteSets,
    pub db_models: Vec<String>,
    pub schema_snapshots: BTreeMap<String, FieldMap>,
    pub service_dependencies: BTreeMap<String, Vec<String>>,
    pub api_payloads: BTreeMap<RouteKey, PayloadShape>,
    pub auth_policies: BTreeMap<RouteKey, String>,
    pub business_flows: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Counters collected while merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub files: usize,
    /// Cross-file disagreements resolved by the conflict policy.
    pub conflicts: usize,
}

/// A merged value and the file it came from.
#[derive(Debug, Clone)]
struct Sourced<T> {
    value: T,
    file: String,
}

#[derive(Debug, Default)]
struct SourcedPayload {
    request: BTreeMap<String, Sourced<String>>,
    response: BTreeMap<String, Sourced<String>>,
}

/// Decide between an existing value and a disagreeing one from `file`.
fn settle<T>(
    policy: ConflictPolicy,
    stats: &mut AggregateStats,
    route: &str,
    field: &str,
    existing: &mut Sourced<T>,
    incoming: T,
    file: &str,
) -> Result<(), AggregateError>
where
    T: PartialEq + ToString,
{
    if existing.value == incoming {
        return Ok(());
    }
    stats.conflicts += 1;
    match policy {
        ConflictPolicy::LastWins => {
            info!(
                route,
                field,
                previous = %existing.value.to_string(),
                previous_file = %existing.file,
                value = %incoming.to_string(),
                file,
                "conflicting association, later file wins"
            );
            existing.value = incoming;
            existing.file = file.to_string();
            Ok(())
        }
        ConflictPolicy::FirstWins => {
            info!(
                route,
                field,
                kept = %existing.value.to_string(),
                kept_file = %existing.file,
                ignored = %incoming.to_string(),
                file,
                "conflicting association, earlier file wins"
            );
            Ok(())
        }
        ConflictPolicy::Error => Err(AggregateError::Conflict {
            route: route.to_string(),
            field: field.to_string(),
            first: existing.value.to_string(),
            first_file: existing.file.clone(),
            second: incoming.to_string(),
            second_file: file.to_string(),
        }),
    }
}

fn merge_fields(
    policy: ConflictPolicy,
    stats: &mut AggregateStats,
    route: &str,
    side: &str,
    into: &mut BTreeMap<String, Sourced<String>>,
    from: FieldMap,
    file: &str,
) -> Result<(), AggregateError> {
    for (name, description) in from {
        match into.get_mut(&name) {
            Some(existing) => {
                let field = format!("{}.{}", side, name);
                settle(policy, stats, route, &field, existing, description, file)?;
            }
            None => {
                into.insert(
                    name,
                    Sourced {
                        value: description,
                        file: file.to_string(),
                    },
                );
            }
        }
    }
    Ok(())
}

/// Lexicographic prefix of a sorted collection.
fn prefix<T: Ord>(items: impl IntoIterator<Item = T>, limit: usize) -> Vec<T> {
    let mut items: Vec<T> = items.into_iter().collect();
    items.sort();
    items.dedup();
    items.truncate(limit);
    items
}

/// Single-threaded merge state.
#[derive(Debug)]
pub struct Aggregator {
    policy: ConflictPolicy,
    limit: usize,
    services: BTreeMap<String, ServiceCategory>,
    public_routes: BTreeSet<RouteKey>,
    internal_routes: BTreeSet<RouteKey>,
    models: BTreeMap<String, ModelSchema>,
    /// Source → lowercased target → first spelling seen.
    dependencies: BTreeMap<String, BTreeMap<String, String>>,
    auth: BTreeMap<RouteKey, Sourced<AuthPolicy>>,
    payloads: BTreeMap<RouteKey, SourcedPayload>,
    flows: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    stats: AggregateStats,
}

impl Aggregator {
    pub fn new(limit: usize, policy: ConflictPolicy) -> Self {
        Self {
            policy,
            limit: limit.max(1),
            services: BTreeMap::new(),
            public_routes: BTreeSet::new(),
            internal_routes: BTreeSet::new(),
            models: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            auth: BTreeMap::new(),
            payloads: BTreeMap::new(),
            flows: BTreeMap::new(),
            stats: AggregateStats::default(),
        }
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    /// Fold one file into the merge state. Callers must add files in path
    /// order for the conflict policy to be meaningful; [`aggregate`] does.
    pub fn add(&mut self, facts: FileFacts) -> Result<(), AggregateError> {
        self.stats.files += 1;
        let file = facts.path;

        for (name, category) in facts.services {
            match self.services.get(&name) {
                Some(existing) if *existing != category => {
                    debug!(
                        service = %name,
                        kept = %existing,
                        ignored = %category,
                        file = %file,
                        "service classified differently, keeping first"
                    );
                }
                Some(_) => {}
                None => {
                    self.services.insert(name, category);
                }
            }
        }

        for route in facts.routes {
            let key = route.key();
            match route.visibility {
                Visibility::Public => self.public_routes.insert(key),
                Visibility::Internal => self.internal_routes.insert(key),
            };
        }

        for (name, schema) in facts.models {
            self.models.entry(name).or_default().overlay(schema);
        }

        for (source, targets) in facts.dependencies {
            let merged = self.dependencies.entry(source).or_default();
            for target in targets {
                merged.entry(target.to_ascii_lowercase()).or_insert(target);
            }
        }

        for (route, record) in facts.associations {
            if let Some(policy) = record.auth {
                match self.auth.get_mut(&route) {
                    Some(existing) => {
                        settle(self.policy, &mut self.stats, &route, "auth", existing, policy, &file)?;
                    }
                    None => {
                        self.auth.insert(
                            route.clone(),
                            Sourced {
                                value: policy,
                                file: file.clone(),
                            },
                        );
                    }
                }
            }
            if !record.payload.is_empty() {
                let merged = self.payloads.entry(route.clone()).or_default();
                let PayloadShape { request, response } = record.payload;
                merge_fields(self.policy, &mut self.stats, &route, "request", &mut merged.request, request, &file)?;
                merge_fields(self.policy, &mut self.stats, &route, "response", &mut merged.response, response, &file)?;
            }
        }

        for (service, methods) in facts.flows {
            let merged = self.flows.entry(service).or_default();
            for (method, steps) in methods {
                merged.entry(method).or_default().extend(steps);
            }
        }

        Ok(())
    }

    /// Apply the size limit and produce the output document.
    pub fn finish(self) -> FactGraph {
        let limit = self.limit;

        let by_category = |wanted: ServiceCategory| {
            prefix(
                self.services
                    .iter()
                    .filter(|(_, c)| **c == wanted)
                    .map(|(name, _)| name.clone()),
                limit,
            )
        };
        let services = ServiceSets {
            business_services: by_category(ServiceCategory::Business),
            utility_services: by_category(ServiceCategory::Utility),
        };

        let api_routes = RouteSets {
            public_routes: prefix(self.public_routes.iter().cloned(), limit),
            internal_routes: prefix(self.internal_routes.iter().cloned(), limit),
        };

        let db_models = prefix(self.models.keys().cloned(), limit);
        // Field maps are records and are never truncated.
        let schema_snapshots = self
            .models
            .iter()
            .take(limit)
            .map(|(name, schema)| (name.clone(), schema.field_map()))
            .collect();

        let service_dependencies = self
            .dependencies
            .into_iter()
            .filter(|(_, targets)| !targets.is_empty())
            .take(limit)
            .map(|(source, targets)| (source, prefix(targets.into_values(), limit)))
            .collect();

        let api_payloads = self
            .payloads
            .into_iter()
            .map(|(route, payload)| {
                let values = |fields: BTreeMap<String, Sourced<String>>| -> FieldMap {
                    fields.into_iter().map(|(k, v)| (k, v.value)).collect()
                };
                let shape = PayloadShape {
                    request: values(payload.request),
                    response: values(payload.response),
                };
                (route, shape)
            })
            .filter(|(_, shape)| !shape.is_empty())
            .take(limit)
            .collect();

        let auth_policies = self
            .auth
            .into_iter()
            .take(limit)
            .map(|(route, policy)| (route, policy.value.to_string()))
            .collect();

        let business_flows = self
            .flows
            .into_iter()
            .filter(|(_, methods)| !methods.is_empty())
            .take(limit)
            .map(|(service, methods)| {
                let methods = methods
                    .into_iter()
                    .take(limit)
                    .map(|(method, steps)| (method, prefix(steps, limit)))
                    .collect();
                (service, methods)
            })
            .collect();

        FactGraph {
            services,
            api_routes,
            db_models,
            schema_snapshots,
            service_dependencies,
            api_payloads,
            auth_policies,
            business_flows,
        }
    }
}

/// Merge every file's facts. Input order does not matter: files are folded
/// in lexicographic path order.
pub fn aggregate(
    mut results: Vec<FileFacts>,
    limit: usize,
    policy: ConflictPolicy,
) -> Result<(FactGraph, AggregateStats), AggregateError> {
    results.sort_by(|a, b| a.path.cmp(&b.path));
    let mut aggregator = Aggregator::new(limit, policy);
    for facts in results {
        aggregator.add(facts)?;
    }
    let stats = aggregator.stats();
    Ok((aggregator.finish(), stats))
}
