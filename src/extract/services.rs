//! Service detectors and dependency edges.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;

use super::canonical::{canonicalize, file_stem_name};
use super::classify::classify_service;
use super::scanner::{
    block_after, class_members, classes, decorator_run, expression_at, inner, line_of,
    matching_close, path_literal, segment_of, split_top_level, string_literal, MemberKind, Segment,
};
use super::types::{Entity, EntityAttributes, EntityKind};
use super::{ScanOptions, SourceUnit};

lazy_static! {
    static ref BINDING_RE: Regex = Regex::new(
        r"\b(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?=[^=>]"
    ).unwrap();
    static ref NEW_RE: Regex = Regex::new(r"\bnew\s+([A-Z][\w$]*)\s*(?:<[^>]*>)?\s*\(").unwrap();
    static ref REGISTRATION_RE: Regex = Regex::new(
        r#"\b(?:register|registerSingleton|registerClass|registerInstance|bind|asClass|asFunction)\s*(?:<[^>]*>)?\s*\(\s*['"]?([A-Za-z_$][\w$.]*)"#
    ).unwrap();
    static ref PROVIDE_RE: Regex = Regex::new(r#"\bprovide\s*:\s*['"]?([A-Za-z_$][\w$.]*)"#).unwrap();
    static ref IMPORT_RE: Regex = Regex::new(
        r#"(?s)\bimport\s+(?:type\s+)?([^;'"]*?)\s*\bfrom\s*['"]([^'"]+)['"]"#
    ).unwrap();
    static ref REQUIRE_RE: Regex = Regex::new(
        r#"\b(?:const|let|var)\s+([^=;]+?)\s*=\s*require\s*\(\s*['"]([^'"]+)['"]\s*\)"#
    ).unwrap();
    static ref MEMBER_CALL_RE: Regex = Regex::new(
        r"\b(?:this\s*\.\s*)?([A-Za-z_$][\w$]*)\s*\.\s*([A-Za-z_$][\w$]*)\s*\("
    ).unwrap();
    static ref EXPORTS_RE: Regex = Regex::new(r"\bmodule\.exports\b|\bexports\.\w+|\bexport\s").unwrap();
}

const SERVICE_SUFFIXES: &[&str] = &["service", "svc", "srv"];

/// Whether an identifier carries a service suffix (`paymentService`,
/// `EmailSvc`). A bare `Service` does not count.
pub fn has_service_suffix(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SERVICE_SUFFIXES
        .iter()
        .any(|s| lower.len() > s.len() && lower.ends_with(s))
}

/// A service declared in the unit, with the text it owns.
#[derive(Debug, Clone)]
pub struct ServiceScope<'a> {
    pub name: String,
    pub offset: usize,
    pub body: Segment<'a>,
    /// Method name and body.
    pub methods: Vec<(&'a str, Segment<'a>)>,
    /// Constructor parameter list of a class.
    pub constructor: Option<Segment<'a>>,
}

fn class_scopes<'a>(text: &'a str, out: &mut Vec<ServiceScope<'a>>) {
    for class in classes(text) {
        if !has_service_suffix(class.name) {
            continue;
        }
        let Some(name) = canonicalize(class.name, EntityKind::Service) else {
            continue;
        };
        let Some((open, close)) = class.body else {
            continue;
        };
        let mut methods = Vec::new();
        let mut constructor = None;
        for member in class_members(text, open, close) {
            if member.name == "constructor" {
                constructor = member.params;
                continue;
            }
            if let Some(body) = member.body {
                if member.kind == MemberKind::Method || body.text.contains("=>") {
                    methods.push((member.name, body));
                }
            }
        }
        out.push(ServiceScope {
            name,
            offset: class.offset,
            body: Segment {
                offset: open + 1,
                text: inner(text, open, close),
            },
            methods,
            constructor,
        });
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Body of a function-valued expression: `(..) => {..}`, `(..) => expr`,
/// `function (..) {..}`.
fn function_body<'a>(text: &'a str, expr: Segment<'a>) -> Option<Segment<'a>> {
    let e = expr.text;
    if let Some(arrow) = e.find("=>") {
        let after = arrow + 2;
        let start = e[after..].len() - e[after..].trim_start().len() + after;
        if e.as_bytes().get(start) == Some(&b'{') {
            let close = matching_close(e, start)?;
            return Some(segment_of(text, &e[start + 1..close]));
        }
        return Some(segment_of(text, e[start..].trim_end()));
    }
    if e.trim_start().starts_with("function") || e.trim_start().starts_with("async") {
        let paren = e.find('(')?;
        let pc = matching_close(e, paren)?;
        let (bo, bc) = block_after(e, pc + 1, b'{')?;
        return Some(segment_of(text, &e[bo + 1..bc]));
    }
    None
}

/// Methods of an object literal: shorthand methods and function-valued
/// properties.
fn object_methods<'a>(text: &'a str, body: &'a str) -> Vec<(&'a str, Segment<'a>)> {
    let mut methods = Vec::new();
    for entry in split_top_level(body, b',') {
        let e = entry.text;
        let lead = e.strip_prefix("async ").map(str::trim_start).unwrap_or(e);
        let lead = lead.trim_start_matches('*').trim_start();
        let name_end = lead.find(|c: char| !is_ident_char(c)).unwrap_or(lead.len());
        let name = &lead[..name_end];
        if name.is_empty() {
            continue;
        }
        let rest = lead[name_end..].trim_start();
        if rest.starts_with('(') {
            let paren = name_end + (lead[name_end..].len() - rest.len());
            let Some(pc) = matching_close(lead, paren) else {
                continue;
            };
            if let Some((bo, bc)) = block_after(lead, pc + 1, b'{') {
                methods.push((name, segment_of(text, &lead[bo + 1..bc])));
            }
        } else if let Some(value) = rest.strip_prefix(':') {
            if let Some(body) = function_body(text, segment_of(text, value.trim_start())) {
                methods.push((name, body));
            }
        }
    }
    methods
}

fn binding_scopes<'a>(text: &'a str, out: &mut Vec<ServiceScope<'a>>) {
    for caps in BINDING_RE.captures_iter(text) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !has_service_suffix(var.as_str()) {
            continue;
        }
        let eq = whole.as_str().rfind('=').unwrap_or(0);
        let init = expression_at(text, whole.start() + eq + 1);
        let value = init.text;
        let is_import = value.starts_with("require(")
            || value.starts_with("await import")
            || value.starts_with("import(");
        let is_declaration = value.starts_with('{') || value.starts_with("new ") || value.contains('(');
        if is_import || !is_declaration || value.starts_with("this.") {
            continue;
        }
        let Some(name) = canonicalize(var.as_str(), EntityKind::Service) else {
            continue;
        };
        // An instance binding owns no code; a factory owns its arguments.
        let (body, methods) = match value.strip_prefix('{').and_then(|v| v.strip_suffix('}')) {
            Some(object) => (segment_of(text, object), object_methods(text, object)),
            None if value.starts_with("new ") => (Segment { offset: init.offset, text: "" }, Vec::new()),
            None => (init, Vec::new()),
        };
        out.push(ServiceScope {
            name,
            offset: whole.start(),
            body,
            methods,
            constructor: None,
        });
    }
}

fn file_name_looks_like_service(path: &str) -> bool {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);
    let lower = stem.to_ascii_lowercase();
    if lower == "index" {
        return false;
    }
    let in_services_dir = path
        .split(['/', '\\'])
        .rev()
        .skip(1)
        .any(|d| d.eq_ignore_ascii_case("services"));
    (has_service_suffix(&lower.replace(['.', '-', '_'], "")) && lower.len() > "service".len())
        || in_services_dir
}

/// Services declared in the unit. The file-name form applies only when
/// no class or binding declared one.
pub fn declared_services<'a>(unit: &'a SourceUnit) -> Vec<ServiceScope<'a>> {
    let text = unit.masked.as_str();
    let mut scopes = Vec::new();
    if unit.is_prisma() {
        return scopes;
    }
    class_scopes(text, &mut scopes);
    binding_scopes(text, &mut scopes);

    if scopes.is_empty() && file_name_looks_like_service(&unit.path) && EXPORTS_RE.is_match(text) {
        if let Some(name) = file_stem_name(&unit.path, EntityKind::Service) {
            let methods = super::scanner::named_functions(text)
                .into_iter()
                .map(|f| (f.name, f.body))
                .collect();
            scopes.push(ServiceScope {
                name,
                offset: 0,
                body: Segment { offset: 0, text },
                methods,
                constructor: None,
            });
        }
    }
    scopes.sort_by_key(|s| s.offset);
    scopes
}

/// Services instantiated or registered in the unit.
fn mentioned_services(text: &str) -> Vec<(String, usize)> {
    let mut out = Vec::new();
    for caps in NEW_RE
        .captures_iter(text)
        .chain(REGISTRATION_RE.captures_iter(text))
        .chain(PROVIDE_RE.captures_iter(text))
    {
        let (Some(whole), Some(raw)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let raw = raw.as_str().rsplit('.').next().unwrap_or_default();
        if !has_service_suffix(raw) {
            continue;
        }
        if let Some(name) = canonicalize(raw, EntityKind::Service) {
            out.push((name, whole.start()));
        }
    }
    out.sort_by_key(|(_, offset)| *offset);
    out
}

/// Service entities of the unit, deduplicated by canonical name.
pub fn detect_services(unit: &SourceUnit, opts: &ScanOptions) -> Vec<Entity> {
    let text = unit.masked.as_str();
    let declared = declared_services(unit)
        .into_iter()
        .map(|s| (s.name, s.offset));
    let mentioned = if unit.is_prisma() {
        Vec::new()
    } else {
        mentioned_services(text)
    };

    let mut entities: Vec<Entity> = Vec::new();
    for (name, offset) in declared.chain(mentioned) {
        if entities.iter().any(|e| e.canonical_name == name) {
            continue;
        }
        let category = classify_service(&name, &unit.path, opts.default_category);
        entities.push(Entity {
            kind: EntityKind::Service,
            line: line_of(text, offset),
            source_file: unit.path.clone(),
            canonical_name: name,
            attributes: EntityAttributes::Service { category },
        });
    }
    entities
}

/// Controller classes (`@Controller` or a controller suffix).
pub fn detect_controllers(unit: &SourceUnit) -> Vec<Entity> {
    let text = unit.masked.as_str();
    let mut entities: Vec<Entity> = Vec::new();
    for class in classes(text) {
        let decorator = class.decorator("Controller");
        let suffixed = class.name.to_ascii_lowercase().ends_with("controller");
        if decorator.is_none() && !suffixed {
            continue;
        }
        let Some(name) = canonicalize(class.name, EntityKind::Controller) else {
            continue;
        };
        if entities.iter().any(|e| e.canonical_name == name) {
            continue;
        }
        let prefix = decorator
            .and_then(|d| d.args.first())
            .and_then(|a| path_literal(a.text));
        entities.push(Entity {
            kind: EntityKind::Controller,
            canonical_name: name,
            source_file: unit.path.clone(),
            line: line_of(text, class.offset),
            attributes: EntityAttributes::Controller { prefix },
        });
    }
    entities
}

// ---------------------------------------------------------------------------
// Dependency signals

fn is_local_module(module: &str) -> bool {
    module.starts_with('.')
        || module.starts_with("@/")
        || module.starts_with("~/")
        || module.starts_with("src/")
}

/// Target of an imported module path, when the module is a service.
fn module_service(module: &str) -> Option<String> {
    if !is_local_module(module) {
        return None;
    }
    let trimmed = module.trim_end_matches('/');
    let file = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let parent_is_services = trimmed
        .rsplit('/')
        .nth(1)
        .map(|d| d.eq_ignore_ascii_case("services"))
        .unwrap_or(false);
    let lower = file.to_ascii_lowercase();
    if lower == "index" || lower == "services" {
        return None;
    }
    if has_service_suffix(&lower.replace(['.', '-', '_'], "")) || parent_is_services {
        canonicalize(file, EntityKind::Service)
    } else {
        None
    }
}

/// Local names bound by an import clause or a `require` left-hand side.
fn bound_names(clause: &str) -> Vec<&str> {
    let clause = clause.trim();
    let mut names = Vec::new();
    let (head, braced) = match clause.find('{') {
        Some(open) => {
            let close = clause.rfind('}').unwrap_or(clause.len());
            (&clause[..open], Some(&clause[open + 1..close.max(open + 1)]))
        }
        None => (clause, None),
    };
    for part in head.split(',') {
        let part = part.trim();
        let local = part.rsplit(" as ").next().unwrap_or(part).trim();
        if !local.is_empty() && local.chars().all(is_ident_char) {
            names.push(local);
        }
    }
    if let Some(list) = braced {
        for item in list.split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            let local = item
                .rsplit(" as ")
                .next()
                .unwrap_or(item)
                .rsplit(':')
                .next()
                .unwrap_or(item)
                .split('=')
                .next()
                .unwrap_or(item)
                .trim();
            if !local.is_empty() && local.chars().all(is_ident_char) {
                names.push(local);
            }
        }
    }
    names
}

/// File-level aliases: imported local name → canonical service, plus the
/// set of imported service targets.
fn import_aliases(text: &str) -> (BTreeMap<String, String>, BTreeSet<String>) {
    let mut aliases = BTreeMap::new();
    let mut targets = BTreeSet::new();
    for caps in IMPORT_RE.captures_iter(text).chain(REQUIRE_RE.captures_iter(text)) {
        let (Some(clause), Some(module)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let from_module = module_service(module.as_str());
        for local in bound_names(clause.as_str()) {
            let target = if has_service_suffix(local) {
                canonicalize(local, EntityKind::Service)
            } else {
                from_module.clone()
            };
            if let Some(target) = target {
                aliases.insert(local.to_string(), target.clone());
                targets.insert(target);
            }
        }
        if let Some(target) = from_module {
            targets.insert(target);
        }
    }
    (aliases, targets)
}

/// Constructor-injected services: name → target.
fn injected(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for param in split_top_level(params, b',') {
        let (decorators, end) = decorator_run(param.text, 0);
        let mut explicit = None;
        for d in decorators.iter().filter(|d| d.simple_name() == "Inject") {
            if let Some(arg) = d.args.first() {
                let raw = string_literal(arg.text).unwrap_or_else(|| arg.text.to_string());
                let raw = raw.rsplit('.').next().unwrap_or_default().to_string();
                explicit = canonicalize(&raw, EntityKind::Service);
            }
        }
        let mut rest = param.text[end.min(param.text.len())..].trim();
        for modifier in ["public ", "private ", "protected ", "readonly "] {
            rest = rest.trim_start_matches(modifier).trim_start();
        }

        if let Some(list) = rest.strip_prefix('{') {
            let list = list.split('}').next().unwrap_or_default();
            for item in list.split(',') {
                let name = item.split([':', '=']).next().unwrap_or_default().trim();
                if has_service_suffix(name) {
                    if let Some(target) = canonicalize(name, EntityKind::Service) {
                        out.push((name.to_string(), target));
                    }
                }
            }
            continue;
        }

        let name = rest
            .split([':', '=', '?'])
            .next()
            .unwrap_or_default()
            .trim();
        let ty = rest
            .split_once(':')
            .map(|(_, t)| t.split('=').next().unwrap_or_default().trim())
            .unwrap_or_default();
        let ty = ty.split('<').next().unwrap_or(ty).trim();
        let target = explicit
            .or_else(|| has_service_suffix(ty).then(|| canonicalize(ty, EntityKind::Service)).flatten())
            .or_else(|| has_service_suffix(name).then(|| canonicalize(name, EntityKind::Service)).flatten());
        if let (Some(target), false) = (target, name.is_empty()) {
            out.push((name.to_string(), target));
        }
    }
    out
}

/// Name → service lookup valid inside one declared service.
pub fn scope_aliases(text: &str, scope: &ServiceScope<'_>) -> BTreeMap<String, String> {
    let (mut aliases, _) = import_aliases(text);
    if let Some(params) = scope.constructor {
        for (name, target) in injected(params.text) {
            aliases.insert(name, target);
        }
    }
    aliases
}

/// Target of a `this.x.m(` / `x.m(` receiver, if it names a service.
pub fn call_target(receiver: &str, aliases: &BTreeMap<String, String>) -> Option<String> {
    match aliases.get(receiver) {
        Some(target) => Some(target.clone()),
        None if has_service_suffix(receiver) => canonicalize(receiver, EntityKind::Service),
        None => None,
    }
}

/// Every `(receiver, method)` call pair in `body`.
pub fn member_calls(body: &str) -> impl Iterator<Item = (&str, &str)> {
    MEMBER_CALL_RE
        .captures_iter(body)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
}

fn insert_ci(set: &mut BTreeSet<String>, name: String) {
    if !set.iter().any(|t| t.eq_ignore_ascii_case(&name)) {
        set.insert(name);
    }
}

/// Dependency edges from each declared service of the unit.
pub fn dependencies(unit: &SourceUnit, scopes: &[ServiceScope<'_>]) -> BTreeMap<String, BTreeSet<String>> {
    let text = unit.masked.as_str();
    let (_, imported) = import_aliases(text);
    let mut edges: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for scope in scopes {
        let aliases = scope_aliases(text, scope);
        let mut targets: BTreeSet<String> = BTreeSet::new();

        for target in &imported {
            insert_ci(&mut targets, target.clone());
        }
        if let Some(params) = scope.constructor {
            for (_, target) in injected(params.text) {
                insert_ci(&mut targets, target);
            }
        }
        for caps in NEW_RE.captures_iter(scope.body.text) {
            if let Some(class) = caps.get(1).map(|m| m.as_str()) {
                if has_service_suffix(class) {
                    if let Some(target) = canonicalize(class, EntityKind::Service) {
                        insert_ci(&mut targets, target);
                    }
                }
            }
        }
        for (receiver, _) in member_calls(scope.body.text) {
            if let Some(target) = call_target(receiver, &aliases) {
                insert_ci(&mut targets, target);
            }
        }

        if !targets.is_empty() {
            let entry = edges.entry(scope.name.clone()).or_default();
            for target in targets {
                insert_ci(entry, target);
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::types::ServiceCategory;
    use pretty_assertions::assert_eq;

    fn names(path: &str, src: &str) -> Vec<(String, ServiceCategory)> {
        let unit = SourceUnit::new(path, src);
        detect_services(&unit, &ScanOptions::default())
            .into_iter()
            .map(|e| match e.attributes {
                EntityAttributes::Service { category } => (e.canonical_name, category),
                _ => unreachable!(),
            })
            .collect()
    }

    fn deps(path: &str, src: &str) -> BTreeMap<String, Vec<String>> {
        let unit = SourceUnit::new(path, src);
        let scopes = declared_services(&unit);
        dependencies(&unit, &scopes)
            .into_iter()
            .map(|(k, v)| (k, v.into_iter().collect()))
            .collect()
    }

    #[test]
    fn test_class_and_binding_declarations() {
        let src = r#"
import { Injectable } from '@nestjs/common';

@Injectable()
export class OrderService {
  constructor(private readonly paymentSvc: PaymentService) {}
}

export const emailService = {
  async send(to) { return mailer.send(to); },
};

const cache = new CacheService();
container.register('auditService', asClass(AuditService));
"#;
        let found = names("src/orders/order.service.ts", src);
        let found: Vec<&str> = found.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(found, vec!["OrderService", "EmailService", "CacheService", "AuditService"]);
    }

    #[test]
    fn test_require_is_not_a_declaration() {
        let src = "const paymentService = require('./paymentService');\nmodule.exports = { pay };";
        assert!(names("src/routes/pay.js", src).is_empty());
    }

    #[test]
    fn test_file_name_fallback() {
        let src = "exports.charge = async (amount) => {\n  return stripe.charges.create({ amount });\n};\n";
        let found = names("src/services/payment.js", src);
        assert_eq!(found, vec![("PaymentService".to_string(), ServiceCategory::Business)]);
        assert!(names("src/services/index.js", src).is_empty());
    }

    #[test]
    fn test_categories() {
        let src = "class LoggerService {}\nclass CheckoutService {}";
        let found = names("src/app.ts", src);
        assert_eq!(
            found,
            vec![
                ("LoggerService".to_string(), ServiceCategory::Utility),
                ("CheckoutService".to_string(), ServiceCategory::Business),
            ]
        );
    }

    #[test]
    fn test_dependency_signals_collapse_to_one_edge() {
        let src = r#"
import { PaymentService } from './payment.service';
import { sendMail } from '../services/email';

export class OrderService {
  constructor(
    private readonly payments: PaymentService,
    @Inject('InventoryService') private inventory,
  ) {}

  async place(order) {
    const audit = new AuditService();
    await this.payments.charge(order.total);
    await this.inventory.reserve(order.items);
    await notificationService.push(order.userId);
    return new PaymentService();
  }
}
"#;
        let found = deps("src/orders/order.service.ts", src);
        assert_eq!(
            found["OrderService"],
            vec![
                "AuditService",
                "EmailService",
                "InventoryService",
                "NotificationService",
                "PaymentService",
            ]
        );
    }

    #[test]
    fn test_destructured_injection() {
        let src = "class ReportService {\n  constructor({ userService, db }) {\n    this.userService = userService;\n  }\n}\n";
        let found = deps("src/report.js", src);
        assert_eq!(found["ReportService"], vec!["UserService"]);
    }

    #[test]
    fn test_controller_detection() {
        let src = "@Controller('orders')\nexport class OrdersController {}\nclass Helper {}";
        let unit = SourceUnit::new("src/orders.controller.ts", src);
        let found = detect_controllers(&unit);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].canonical_name, "OrdersController");
        assert_eq!(
            found[0].attributes,
            EntityAttributes::Controller {
                prefix: Some("orders".to_string())
            }
        );
    }
}
