//! Per-file fact extraction.
//!
//! [`scan_source`] is a pure function of `(path, text, options)`: it never
//! touches the filesystem and shares no state, so files can be scanned in
//! any order and in parallel.

pub mod associate;
pub mod canonical;
pub mod classify;
pub mod dialect;
pub mod flows;
pub mod models;
pub mod payload;
pub mod routes;
pub mod scanner;
pub mod services;
pub mod types;

use globset::GlobSet;
use tracing::trace;

use self::payload::PayloadContext;
use self::types::{
    Entity, EntityAttributes, EntityKind, FileFacts, RouteDescriptor, ServiceCategory,
};

/// Internal-path keywords used when no configuration overrides them.
pub const DEFAULT_INTERNAL_KEYWORDS: &[&str] = &[
    "admin",
    "internal",
    "debug",
    "metrics",
    "analytics",
    "cron",
    "webhook",
    "logs",
];

/// One file's text, with a comment-masked copy used by every detector.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Path relative to the scan root, `/`-separated.
    pub path: String,
    pub text: String,
    /// `text` with comments blanked; offsets are identical.
    pub masked: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into().replace('\\', "/");
        let text = text.into();
        let masked = scanner::mask_comments(&text);
        Self { path, text, masked }
    }

    pub fn ext(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .unwrap_or_default()
    }

    pub fn is_prisma(&self) -> bool {
        self.ext().eq_ignore_ascii_case("prisma")
    }
}

/// Options every detector reads.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub internal_keywords: Vec<String>,
    /// Normalized route paths matching this set are discarded.
    pub excluded_routes: GlobSet,
    pub default_category: ServiceCategory,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            internal_keywords: DEFAULT_INTERNAL_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            excluded_routes: GlobSet::empty(),
            default_category: ServiceCategory::default(),
        }
    }
}

fn route_entities(unit: &SourceUnit, opts: &ScanOptions) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    for site in routes::detect_routes(unit, opts) {
        let key = site.route.key();
        if entities.iter().any(|e| e.canonical_name == key) {
            continue;
        }
        entities.push(Entity {
            kind: EntityKind::Route,
            canonical_name: key,
            source_file: unit.path.clone(),
            line: site.route.line,
            attributes: EntityAttributes::Route { route: site.route },
        });
    }
    entities
}

/// Entities of one kind found in the unit, deduplicated by canonical name
/// (routes by `METHOD /path`).
pub fn extract(unit: &SourceUnit, kind: EntityKind, opts: &ScanOptions) -> Vec<Entity> {
    match kind {
        EntityKind::Service => services::detect_services(unit, opts),
        EntityKind::Controller => services::detect_controllers(unit),
        EntityKind::Model => models::detect_models(unit),
        EntityKind::Route => route_entities(unit, opts),
        EntityKind::FlowStep => {
            let scopes = services::declared_services(unit);
            flows::detect_flow_steps(unit, &scopes)
        }
    }
}

/// Every fact of one file.
pub fn scan_source(path: &str, text: &str, opts: &ScanOptions) -> FileFacts {
    let unit = SourceUnit::new(path, text);
    let mut facts = FileFacts::empty(&unit.path);

    for entity in services::detect_services(&unit, opts) {
        if let EntityAttributes::Service { category } = entity.attributes {
            facts.services.entry(entity.canonical_name).or_insert(category);
        }
    }

    for entity in models::detect_models(&unit) {
        if let EntityAttributes::Model { schema } = entity.attributes {
            facts.models.insert(entity.canonical_name, schema);
        }
    }

    let sites = routes::detect_routes(&unit, opts);
    if !sites.is_empty() {
        let ctx = PayloadContext::build(&unit.masked);
        let fragments = associate::collect_fragments(&unit, &sites, &ctx);
        let descriptors: Vec<RouteDescriptor> = sites.iter().map(|s| s.route.clone()).collect();
        facts.associations = associate::associate(&descriptors, &fragments);
        for route in descriptors {
            if !facts.routes.iter().any(|r| r.key() == route.key()) {
                facts.routes.push(route);
            }
        }
    }

    let scopes = services::declared_services(&unit);
    facts.dependencies = services::dependencies(&unit, &scopes);
    facts.flows = flows::flows(&unit, &scopes);

    trace!(
        file = %facts.path,
        services = facts.services.len(),
        models = facts.models.len(),
        routes = facts.routes.len(),
        "scanned"
    );
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::types::{AuthPolicy, Visibility};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_source_unit_paths() {
        let unit = SourceUnit::new("prisma\\schema.prisma", "model A {}");
        assert_eq!(unit.path, "prisma/schema.prisma");
        assert!(unit.is_prisma());
        assert_eq!(SourceUnit::new("src/app", "").ext(), "");
        assert_eq!(SourceUnit::new("src/app.test.ts", "").ext(), "ts");
    }

    #[test]
    fn test_scan_source_express_file() {
        let src = r#"
const express = require('express');
const orderService = require('../services/orderService');
const router = express.Router();

router.use(authenticate);

router.get('/orders/:orderId', async (req, res) => {
  const order = await orderService.find(req.params.orderId);
  res.json({ id: order.id, status: order.status });
});

router.get('/admin/metrics', isAdmin, (req, res) => res.json({}));

module.exports = router;
"#;
        let facts = scan_source("src/routes/orders.js", src, &ScanOptions::default());
        let keys: Vec<String> = facts.routes.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["GET /orders/:id", "GET /admin/metrics"]);
        assert_eq!(facts.routes[1].visibility, Visibility::Internal);
        assert_eq!(facts.associations["GET /orders/:id"].auth, Some(AuthPolicy::Authenticated));
        assert_eq!(facts.associations["GET /admin/metrics"].auth, Some(AuthPolicy::AdminOnly));
        assert!(facts.services.is_empty());
    }

    #[test]
    fn test_extract_dispatches_by_kind() {
        let src = "class BillingService {\n  run() { return Invoice.findAll(); }\n}\n";
        let unit = SourceUnit::new("src/billing.service.ts", src);
        let opts = ScanOptions::default();
        assert_eq!(extract(&unit, EntityKind::Service, &opts).len(), 1);
        assert_eq!(extract(&unit, EntityKind::FlowStep, &opts).len(), 1);
        assert!(extract(&unit, EntityKind::Model, &opts).is_empty());
        assert!(extract(&unit, EntityKind::Route, &opts).is_empty());
    }

    #[test]
    fn test_prisma_file_yields_models_only() {
        let facts = scan_source(
            "prisma/schema.prisma",
            "model Order {\n  id Int @id\n  total Float\n}\n",
            &ScanOptions::default(),
        );
        assert_eq!(facts.models.keys().collect::<Vec<_>>(), vec!["Order"]);
        assert!(facts.routes.is_empty() && facts.services.is_empty());
    }
}
