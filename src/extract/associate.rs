//! Association of auth policies and payload shapes with routes.
//!
//! Fragments are processed tier by tier (route-local, then path-scoped,
//! then file-global) and by source offset inside a tier. A field that
//! already holds a value is never overwritten, so precedence is a matter
//! of processing order alone and physical placement in the file does not
//! matter.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use super::classify::{classify_auth, MiddlewareExpr};
use super::payload::{
    payload_from_middleware, request_from_handler, request_from_params, response_from_handler,
    PayloadContext,
};
use super::routes::{normalize_path, RouteSite};
use super::scanner::{call_args, classes, object_entry, path_literal, split_top_level, strip_braces, Segment};
use super::types::{AssociationRecord, AuthPolicy, FieldMap, RouteDescriptor, RouteKey};
use super::SourceUnit;

lazy_static! {
    static ref USE_RE: Regex = Regex::new(r"\b([A-Za-z_$][\w$]*)\s*\.\s*use\s*\(").unwrap();
    static ref ACCESS_COMMENT_RE: Regex =
        Regex::new(r"(?m)(?://|\*)\s*@access\s+([A-Za-z][\w/:-]*)").unwrap();
}

/// Hook keys of a Fastify route options object that hold middleware.
const FASTIFY_HOOKS: &[&str] = &["preHandler", "onRequest", "preValidation"];

/// Where a fragment applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentScope {
    /// One route, by index into the route list.
    RouteLocal(usize),
    /// Every route whose path lies under the prefix.
    PathScoped(String),
    /// Every route in the file.
    FileGlobal,
    /// A grouping call whose prefix is not a literal. Contributes nothing.
    Unresolved,
}

impl FragmentScope {
    fn tier(&self) -> u8 {
        match self {
            FragmentScope::RouteLocal(_) => 0,
            FragmentScope::PathScoped(_) => 1,
            FragmentScope::FileGlobal => 2,
            FragmentScope::Unresolved => 3,
        }
    }
}

/// What a fragment writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    Auth(AuthPolicy),
    Request(FieldMap),
    Response(FieldMap),
}

/// A scoped policy or payload producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFragment {
    pub scope: FragmentScope,
    pub offset: usize,
    pub contribution: Contribution,
}

/// Segment-aware prefix test: `/admin` covers `/admin` and `/admin/x`,
/// never `/administrator`.
fn covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

/// Resolve fragments against the routes of one file.
pub fn associate(
    routes: &[RouteDescriptor],
    fragments: &[ContextFragment],
) -> BTreeMap<RouteKey, AssociationRecord> {
    let mut ordered: Vec<&ContextFragment> = fragments.iter().collect();
    ordered.sort_by_key(|f| (f.scope.tier(), f.offset));

    let mut records: BTreeMap<RouteKey, AssociationRecord> = BTreeMap::new();
    for fragment in ordered {
        let targets: Vec<&RouteDescriptor> = match &fragment.scope {
            FragmentScope::RouteLocal(idx) => routes.get(*idx).into_iter().collect(),
            FragmentScope::PathScoped(prefix) => {
                routes.iter().filter(|r| covers(prefix, &r.path)).collect()
            }
            FragmentScope::FileGlobal => routes.iter().collect(),
            FragmentScope::Unresolved => {
                debug!(offset = fragment.offset, "dropping fragment with unresolved prefix");
                continue;
            }
        };
        for route in targets {
            let record = records.entry(route.key()).or_default();
            match &fragment.contribution {
                Contribution::Auth(policy) => {
                    if record.auth.is_none() {
                        record.auth = Some(policy.clone());
                    }
                }
                Contribution::Request(fields) => union(&mut record.payload.request, fields),
                Contribution::Response(fields) => union(&mut record.payload.response, fields),
            }
        }
    }
    records.retain(|_, r| r.auth.is_some() || !r.payload.is_empty());
    records
}

fn union(into: &mut FieldMap, from: &FieldMap) {
    for (name, description) in from {
        into.entry(name.clone())
            .or_insert_with(|| description.clone());
    }
}

// ---------------------------------------------------------------------------
// Fragment collection

fn push_payload(
    out: &mut Vec<ContextFragment>,
    scope: &FragmentScope,
    offset: usize,
    request: FieldMap,
    response: FieldMap,
) {
    if !request.is_empty() {
        out.push(ContextFragment {
            scope: scope.clone(),
            offset,
            contribution: Contribution::Request(request),
        });
    }
    if !response.is_empty() {
        out.push(ContextFragment {
            scope: scope.clone(),
            offset,
            contribution: Contribution::Response(response),
        });
    }
}

fn push_auth(out: &mut Vec<ContextFragment>, scope: &FragmentScope, offset: usize, expr: &str) {
    if let Some(policy) = MiddlewareExpr::parse(expr).and_then(|e| classify_auth(&e)) {
        out.push(ContextFragment {
            scope: scope.clone(),
            offset,
            contribution: Contribution::Auth(policy),
        });
    }
}

/// Contributions of one middleware argument, decorator or options object.
fn middleware_fragments<'a>(
    segment: Segment<'a>,
    scope: &FragmentScope,
    ctx: &PayloadContext<'a>,
    out: &mut Vec<ContextFragment>,
) {
    let text = segment.text.trim();

    if let Some(decorator) = text.strip_prefix('@') {
        let name = decorator.split('(').next().unwrap_or_default().trim();
        let simple = name.rsplit('.').next().unwrap_or(name);
        if simple == "UseGuards" {
            if let Some(open) = text.find('(') {
                if let Some((args, _)) = call_args(text, open) {
                    for arg in args {
                        push_auth(out, scope, segment.offset + arg.offset, arg.text);
                    }
                }
            }
        } else if !simple.starts_with("Api") {
            push_auth(out, scope, segment.offset, decorator);
        }
        return;
    }

    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let base = segment.offset + 1;
        for item in split_top_level(inner, b',') {
            middleware_fragments(
                Segment {
                    offset: base + item.offset,
                    text: item.text,
                },
                scope,
                ctx,
                out,
            );
        }
        return;
    }

    if let Some(body) = strip_braces(text) {
        for hook in FASTIFY_HOOKS {
            if let Some(value) = object_entry(body, hook) {
                let hooked = Segment {
                    offset: segment.offset,
                    text: value,
                };
                middleware_fragments(hooked, scope, ctx, out);
            }
        }
    } else {
        push_auth(out, scope, segment.offset, text);
    }

    let shape = payload_from_middleware(text, ctx);
    push_payload(out, scope, segment.offset, shape.request, shape.response);
}

fn is_reference(expr: &str) -> bool {
    !expr.is_empty()
        && !expr.starts_with(|c: char| c.is_ascii_digit())
        && expr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

/// Function body text for a handler: names are looked up among same-file
/// functions, wrapper calls (`asyncHandler(createOrder)`) are unwrapped,
/// inline functions and method bodies are used as-is.
fn handler_text<'a>(expr: &'a str, ctx: &PayloadContext<'a>, depth: usize) -> Option<&'a str> {
    let expr = expr.trim();
    if is_reference(expr) {
        return ctx.handler_body(expr).map(|body| body.text);
    }
    let inline = expr.contains("=>") || expr.starts_with("function") || expr.starts_with("async");
    if !inline && depth < 3 {
        if let Some(open) = expr.find('(') {
            if is_reference(expr[..open].trim()) {
                if let Some((args, close)) = call_args(expr, open) {
                    if close + 1 == expr.len() {
                        return handler_text(args.last()?.text, ctx, depth + 1);
                    }
                }
            }
        }
    }
    Some(expr)
}

fn is_screaming_case(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '$')
}

/// Whether a same-file binding holds a string, template or environment value.
fn bound_to_path(name: &str, ctx: &PayloadContext<'_>) -> bool {
    ctx.binding(name).is_some_and(|init| {
        let init = init.trim();
        init.starts_with(['\'', '"', '`']) || init.starts_with("process.env")
    })
}

/// Non-literal first arguments of `.use(..)` that read like a path.
fn looks_like_dynamic_prefix(expr: &str, ctx: &PayloadContext<'_>) -> bool {
    let expr = expr.trim();
    if expr.starts_with('`') || expr.contains(" + ") {
        return true;
    }
    if !is_reference(expr) {
        return false;
    }
    let last = expr.rsplit('.').next().unwrap_or(expr);
    let lower = expr.to_ascii_lowercase();
    is_screaming_case(last)
        || bound_to_path(expr, ctx)
        || ["path", "prefix", "route", "base", "url", "mount"]
            .iter()
            .any(|hint| lower.contains(hint))
}

fn access_policy(tag: &str) -> Option<AuthPolicy> {
    let tag = tag.to_ascii_lowercase();
    if tag.contains("admin") {
        Some(AuthPolicy::AdminOnly)
    } else if ["private", "protected", "authenticated", "auth", "user"]
        .iter()
        .any(|t| tag.starts_with(t))
    {
        Some(AuthPolicy::Authenticated)
    } else {
        None
    }
}

/// Collect every fragment of a file.
pub fn collect_fragments<'a>(
    unit: &'a SourceUnit,
    sites: &[RouteSite<'a>],
    ctx: &PayloadContext<'a>,
) -> Vec<ContextFragment> {
    let mut out = Vec::new();
    let text = unit.masked.as_str();

    // Route-local: middleware, handlers, handler params.
    for (idx, site) in sites.iter().enumerate() {
        let scope = FragmentScope::RouteLocal(idx);
        for segment in &site.middleware {
            middleware_fragments(*segment, &scope, ctx, &mut out);
        }
        if let Some(handler) = site.handler {
            if let Some(body) = handler_text(handler.text, ctx, 0) {
                push_payload(
                    &mut out,
                    &scope,
                    handler.offset,
                    request_from_handler(body),
                    response_from_handler(body),
                );
            }
        }
        if let Some(params) = site.params {
            push_payload(
                &mut out,
                &scope,
                params.offset,
                request_from_params(params.text, ctx),
                FieldMap::new(),
            );
        }
    }

    // `// @access Private` comments apply to the nearest following route.
    for caps in ACCESS_COMMENT_RE.captures_iter(&unit.text) {
        let (Some(whole), Some(tag)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(policy) = access_policy(tag.as_str()) else {
            continue;
        };
        let next = sites
            .iter()
            .enumerate()
            .filter(|(_, s)| s.route.offset > whole.start())
            .min_by_key(|(_, s)| s.route.offset);
        if let Some((idx, _)) = next {
            out.push(ContextFragment {
                scope: FragmentScope::RouteLocal(idx),
                offset: whole.start(),
                contribution: Contribution::Auth(policy),
            });
        }
    }

    // Grouping calls: `router.use(..)`.
    for caps in USE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let Some((args, _)) = call_args(text, whole.end() - 1) else {
            continue;
        };
        let Some(first) = args.first() else {
            continue;
        };
        let (scope, middleware) = match path_literal(first.text) {
            Some(prefix) if !first.text.starts_with('`') || !prefix.contains("${") => {
                (FragmentScope::PathScoped(normalize_path(&prefix)), &args[1..])
            }
            Some(_) => (FragmentScope::Unresolved, &args[1..]),
            None if args.len() > 1 && looks_like_dynamic_prefix(first.text, ctx) => {
                (FragmentScope::Unresolved, &args[1..])
            }
            None => (FragmentScope::FileGlobal, &args[..]),
        };
        if scope == FragmentScope::Unresolved {
            debug!(file = %unit.path, expr = first.text, "use() with non-literal prefix ignored");
            continue;
        }
        for segment in middleware {
            middleware_fragments(*segment, &scope, ctx, &mut out);
        }
    }

    // Controller-level decorators apply under the controller prefix.
    for class in classes(text) {
        let Some(controller) = class.decorator("Controller") else {
            continue;
        };
        let prefix = controller
            .args
            .first()
            .and_then(|a| {
                path_literal(a.text).or_else(|| {
                    strip_braces(a.text)
                        .and_then(|b| object_entry(b, "path"))
                        .and_then(path_literal)
                })
            })
            .unwrap_or_default();
        let scope = FragmentScope::PathScoped(normalize_path(&prefix));
        for decorator in class.decorators.iter().filter(|d| d.simple_name() != "Controller") {
            let segment = Segment {
                offset: decorator.offset,
                text: decorator.text,
            };
            middleware_fragments(segment, &scope, ctx, &mut out);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::routes::detect_routes;
    use crate::extract::ScanOptions;
    use crate::extract::types::{HttpMethod, Visibility};
    use pretty_assertions::assert_eq;

    fn route(method: HttpMethod, path: &str, offset: usize) -> RouteDescriptor {
        RouteDescriptor {
            method,
            path: path.to_string(),
            visibility: Visibility::Public,
            offset,
            line: 1,
        }
    }

    fn auth(scope: FragmentScope, offset: usize, policy: AuthPolicy) -> ContextFragment {
        ContextFragment {
            scope,
            offset,
            contribution: Contribution::Auth(policy),
        }
    }

    fn run(path: &str, source: &str) -> BTreeMap<RouteKey, AssociationRecord> {
        let unit = SourceUnit::new(path, source);
        let sites = detect_routes(&unit, &ScanOptions::default());
        let ctx = PayloadContext::build(&unit.masked);
        let fragments = collect_fragments(&unit, &sites, &ctx);
        let routes: Vec<_> = sites.iter().map(|s| s.route.clone()).collect();
        associate(&routes, &fragments)
    }

    fn auth_of(records: &BTreeMap<RouteKey, AssociationRecord>, key: &str) -> Option<String> {
        records.get(key).and_then(|r| r.auth.as_ref()).map(|p| p.to_string())
    }

    #[test]
    fn test_route_local_beats_global_regardless_of_order() {
        let routes = vec![
            route(HttpMethod::Get, "/a", 10),
            route(HttpMethod::Get, "/b", 20),
        ];
        // The global fragment appears first physically.
        let fragments = vec![
            auth(FragmentScope::FileGlobal, 0, AuthPolicy::Authenticated),
            auth(FragmentScope::RouteLocal(1), 25, AuthPolicy::AdminOnly),
        ];
        let records = associate(&routes, &fragments);
        assert_eq!(records["GET /a"].auth, Some(AuthPolicy::Authenticated));
        assert_eq!(records["GET /b"].auth, Some(AuthPolicy::AdminOnly));
    }

    #[test]
    fn test_path_scope_is_segment_aware() {
        assert!(covers("/admin", "/admin"));
        assert!(covers("/admin", "/admin/users"));
        assert!(!covers("/admin", "/administrator"));
        assert!(covers("/", "/anything"));
    }

    #[test]
    fn test_payload_fields_union() {
        let routes = vec![route(HttpMethod::Post, "/x", 0)];
        let mut first = FieldMap::new();
        first.insert("a".into(), "String".into());
        first.insert("shared".into(), "Number".into());
        let mut second = FieldMap::new();
        second.insert("b".into(), "Boolean".into());
        second.insert("shared".into(), "String".into());
        let fragments = vec![
            ContextFragment {
                scope: FragmentScope::FileGlobal,
                offset: 0,
                contribution: Contribution::Request(second),
            },
            ContextFragment {
                scope: FragmentScope::RouteLocal(0),
                offset: 5,
                contribution: Contribution::Request(first),
            },
        ];
        let records = associate(&routes, &fragments);
        let request = &records["POST /x"].payload.request;
        assert_eq!(request.len(), 3);
        assert_eq!(request["shared"], "Number");
    }

    #[test]
    fn test_express_file_end_to_end() {
        let src = r#"
const router = express.Router();

router.get('/public/status', (req, res) => res.json({ ok: true }));

// @desc Delete a user
// @access Private/Admin
router.delete('/users/:id', removeUser);

router.post('/orders', requireRole('manager'), validate(orderSchema), createOrder);

router.use(authenticate);
router.use('/admin', isAdmin);
router.use(basePath, verifyApiKey);

router.get('/admin/stats', stats);
router.get('/administrator', misc);

const orderSchema = Joi.object({ sku: Joi.string().required() });

async function createOrder(req, res) {
  const { note } = req.body;
  res.status(201).json({ id: 1, sku: req.body.sku });
}
"#;
        let records = run("src/routes/index.js", src);
        assert_eq!(auth_of(&records, "GET /public/status").as_deref(), Some("Authenticated"));
        assert_eq!(auth_of(&records, "DELETE /users/:id").as_deref(), Some("AdminOnly"));
        assert_eq!(auth_of(&records, "POST /orders").as_deref(), Some("Role:manager"));
        assert_eq!(auth_of(&records, "GET /admin/stats").as_deref(), Some("AdminOnly"));
        assert_eq!(auth_of(&records, "GET /administrator").as_deref(), Some("Authenticated"));

        let order = &records["POST /orders"].payload;
        assert_eq!(
            order.request.keys().cloned().collect::<Vec<_>>(),
            vec!["note", "sku"]
        );
        assert_eq!(order.request["sku"], "String (required)");
        assert_eq!(
            order.response.keys().cloned().collect::<Vec<_>>(),
            vec!["id", "sku"]
        );
        assert_eq!(
            records["GET /public/status"].payload.response.keys().cloned().collect::<Vec<_>>(),
            vec!["ok"]
        );
    }

    #[test]
    fn test_unresolved_prefix_constants_are_dropped() {
        let src = r#"
const API_ROOT = process.env.API_ROOT;
const v2 = '/v2';

router.use(API_ROOT, requireAdmin);
router.use(config.ADMIN_ROOT, requireAdmin);
router.use(v2, requireAdmin);

router.get('/orders', listOrders);
"#;
        let records = run("src/routes/orders.js", src);
        assert_eq!(auth_of(&records, "GET /orders"), None);

        let global = "router.use(cors(), requireAdmin);\nrouter.get('/orders', listOrders);\n";
        let records = run("src/routes/orders.js", global);
        assert_eq!(auth_of(&records, "GET /orders").as_deref(), Some("AdminOnly"));
    }

    #[test]
    fn test_nest_guards() {
        let src = r#"
@UseGuards(JwtAuthGuard)
@Controller('reports')
export class ReportsController {
  @Get()
  list() { return []; }

  @UseGuards(AdminGuard)
  @Post()
  create(@Body() dto: CreateReportDto) { return { id: 1 }; }
}

class CreateReportDto {
  @IsString()
  title: string;
}
"#;
        let records = run("src/reports.controller.ts", src);
        assert_eq!(auth_of(&records, "GET /reports").as_deref(), Some("JWT Required"));
        assert_eq!(auth_of(&records, "POST /reports").as_deref(), Some("AdminOnly"));
        let create = &records["POST /reports"].payload;
        assert_eq!(create.request["title"], "String (required)");
        assert_eq!(create.response.keys().cloned().collect::<Vec<_>>(), vec!["id"]);
    }
}
