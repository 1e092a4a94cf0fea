//! Route detection, path normalization and visibility.
//!
//! Detectors run over the comment-masked text in a fixed order:
//! router calls, `.route()` chains and Fastify route objects, Nest
//! controllers, then Next.js file-system routes.

use lazy_static::lazy_static;
use regex::Regex;

use super::scanner::{
    call_args, class_members, classes, line_of, named_functions, object_entry, path_literal,
    segment_of, skip_ws, string_list, string_literal, strip_braces, Segment,
};
use super::types::{HttpMethod, RouteDescriptor, Visibility};
use super::{ScanOptions, SourceUnit};

lazy_static! {
    static ref ROUTER_CALL_RE: Regex = Regex::new(
        r"([A-Za-z_$][\w$]*)\s*\.\s*(get|post|put|patch|delete|del|options|head|all)\s*\("
    )
    .unwrap();
    static ref CHAIN_RE: Regex = Regex::new(r"\.\s*route\s*\(").unwrap();
    static ref CHAIN_METHOD_RE: Regex =
        Regex::new(r"^\.\s*(get|post|put|patch|delete|options|head|all)\s*\(").unwrap();
    static ref TEMPLATE_PARAM_RE: Regex = Regex::new(r"\$\{[^}]*\}").unwrap();
    static ref REQ_METHOD_RE: Regex =
        Regex::new(r#"\.method\s*===?\s*['"]([A-Za-z]+)['"]"#).unwrap();
    static ref CASE_METHOD_RE: Regex =
        Regex::new(r#"case\s+['"](GET|POST|PUT|PATCH|DELETE|OPTIONS|HEAD)['"]"#).unwrap();
    static ref EXPORT_ALIAS_RE: Regex =
        Regex::new(r"export\s*\{([^}]*)\}").unwrap();
}

/// Receivers whose `.get(..)` / `.post(..)` are HTTP clients or plain
/// containers, not route registrations.
const CLIENT_RECEIVERS: &[&str] = &[
    "axios",
    "http",
    "https",
    "fetch",
    "request",
    "superagent",
    "got",
    "ky",
    "client",
    "api",
    "apiClient",
    "httpClient",
    "$http",
    "cy",
    "agent",
    "redis",
    "cache",
    "map",
    "params",
    "searchParams",
    "headers",
    "store",
    "localStorage",
    "sessionStorage",
    "config",
    "req",
    "res",
    "response",
    "cookies",
    "session",
    "storage",
    "knex",
    "db",
    "this",
];

const NEST_METHODS: &[&str] = &["Get", "Post", "Put", "Patch", "Delete", "Options", "Head", "All"];

/// A route declaration together with the argument text around it.
#[derive(Debug, Clone)]
pub struct RouteSite<'a> {
    pub route: RouteDescriptor,
    /// Arguments and decorators between the path and the handler.
    pub middleware: Vec<Segment<'a>>,
    /// Handler expression, function body, or method body.
    pub handler: Option<Segment<'a>>,
    /// Handler parameter list when the handler is a decorated method.
    pub params: Option<Segment<'a>>,
}

/// Normalize a raw route path.
///
/// Query strings and fragments are dropped, parameter segments in every
/// supported syntax collapse to `:id`, Next.js route groups disappear and
/// the result always has a leading and no trailing slash.
pub fn normalize_path(raw: &str) -> String {
    let raw = strip_query(raw);
    let raw = TEMPLATE_PARAM_RE.replace_all(raw, ":id");
    let segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty())
        .filter_map(normalize_segment)
        .collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// A `?` followed by `/` or the end is an optional-parameter marker;
/// any other `?` starts a query string.
fn strip_query(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'#' => return &raw[..i],
            b'?' if !matches!(bytes.get(i + 1), None | Some(b'/')) => return &raw[..i],
            _ => {}
        }
    }
    raw
}

fn normalize_segment(seg: &str) -> Option<&str> {
    let wrapped = |open: char, close: char| seg.starts_with(open) && seg.ends_with(close);
    if wrapped('(', ')') && !seg.contains('*') {
        // Route group.
        return None;
    }
    if seg.starts_with(':') || wrapped('[', ']') || wrapped('{', '}') || wrapped('<', '>') {
        return Some(":id");
    }
    Some(seg)
}

/// Internal when any segment is a keyword or starts with keyword + `-`/`_`.
pub fn visibility(path: &str, keywords: &[String]) -> Visibility {
    let internal = path.split('/').filter(|s| !s.is_empty()).any(|seg| {
        let seg = seg.to_ascii_lowercase();
        keywords.iter().any(|kw| {
            let kw = kw.to_ascii_lowercase();
            seg == kw
                || seg
                    .strip_prefix(kw.as_str())
                    .map(|rest| rest.starts_with(['-', '_']))
                    .unwrap_or(false)
        })
    });
    if internal {
        Visibility::Internal
    } else {
        Visibility::Public
    }
}

fn is_catch_all(path: &str) -> bool {
    path.split('/').any(|seg| seg.starts_with('*') || seg.contains("(.*)"))
}

/// Join a controller prefix and a method path.
fn join_paths(prefix: &str, sub: &str) -> String {
    normalize_path(&format!("{}/{}", prefix, sub))
}

fn descriptor(
    unit: &SourceUnit,
    opts: &ScanOptions,
    method: HttpMethod,
    path: String,
    offset: usize,
) -> Option<RouteDescriptor> {
    if is_catch_all(&path) || opts.excluded_routes.is_match(&path) {
        tracing::debug!(file = %unit.path, path = %path, "route discarded by filter");
        return None;
    }
    Some(RouteDescriptor {
        method,
        visibility: visibility(&path, &opts.internal_keywords),
        path,
        offset,
        line: line_of(&unit.masked, offset),
    })
}

/// All route declarations in the unit, ordered by source offset.
pub fn detect_routes<'a>(unit: &'a SourceUnit, opts: &ScanOptions) -> Vec<RouteSite<'a>> {
    if unit.is_prisma() {
        return Vec::new();
    }
    let mut sites = Vec::new();
    router_calls(unit, opts, &mut sites);
    chains(unit, opts, &mut sites);
    nest_controllers(unit, opts, &mut sites);
    next_app_routes(unit, opts, &mut sites);
    next_pages_routes(unit, opts, &mut sites);
    sites.sort_by_key(|s| s.route.offset);
    sites
}

/// `app.get('/path', mw, handler)`.
fn router_calls<'a>(unit: &'a SourceUnit, opts: &ScanOptions, out: &mut Vec<RouteSite<'a>>) {
    let text = unit.masked.as_str();
    for caps in ROUTER_CALL_RE.captures_iter(text) {
        let (Some(whole), Some(receiver), Some(verb)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if CLIENT_RECEIVERS.contains(&receiver.as_str()) {
            continue;
        }
        let open = whole.end() - 1;
        let Some((args, _)) = call_args(text, open) else {
            continue;
        };
        // A route registration has a path and at least a handler.
        if args.len() < 2 {
            continue;
        }
        let Some(raw_path) = path_literal(args[0].text) else {
            continue;
        };
        let Some(method) = HttpMethod::parse(verb.as_str()) else {
            continue;
        };
        if let Some(route) =
            descriptor(unit, opts, method, normalize_path(&raw_path), receiver.start())
        {
            out.push(RouteSite {
                route,
                middleware: args[1..args.len() - 1].to_vec(),
                handler: args.last().copied(),
                params: None,
            });
        }
    }
}

/// `.route('/path').get(..).post(..)` and Fastify `.route({ method, url })`.
fn chains<'a>(unit: &'a SourceUnit, opts: &ScanOptions, out: &mut Vec<RouteSite<'a>>) {
    let text = unit.masked.as_str();
    for m in CHAIN_RE.find_iter(text) {
        let open = m.end() - 1;
        let Some((args, close)) = call_args(text, open) else {
            continue;
        };
        let Some(first) = args.first() else {
            continue;
        };

        if let Some(body) = strip_braces(first.text) {
            fastify_route(unit, opts, first, body, m.start(), out);
            continue;
        }

        let Some(raw_path) = path_literal(first.text) else {
            continue;
        };
        let path = normalize_path(&raw_path);
        let mut cursor = close + 1;
        loop {
            let at = skip_ws(text, cursor);
            let Some(caps) = CHAIN_METHOD_RE.captures(&text[at..]) else {
                break;
            };
            let (Some(whole), Some(verb)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            let call_open = at + whole.end() - 1;
            let Some((call, call_close)) = call_args(text, call_open) else {
                break;
            };
            if let Some(method) = HttpMethod::parse(verb.as_str()) {
                if let Some(route) = descriptor(unit, opts, method, path.clone(), at) {
                    let split = call.len().saturating_sub(1);
                    out.push(RouteSite {
                        route,
                        middleware: call[..split].to_vec(),
                        handler: call.last().copied(),
                        params: None,
                    });
                }
            }
            cursor = call_close + 1;
        }
    }
}

fn fastify_route<'a>(
    unit: &'a SourceUnit,
    opts: &ScanOptions,
    object: &Segment<'a>,
    body: &'a str,
    offset: usize,
    out: &mut Vec<RouteSite<'a>>,
) {
    let Some(raw_path) = object_entry(body, "url")
        .or_else(|| object_entry(body, "path"))
        .and_then(path_literal)
    else {
        return;
    };
    let methods: Vec<HttpMethod> = match object_entry(body, "method") {
        Some(expr) => {
            let names = match string_literal(expr) {
                Some(single) => vec![single],
                None => string_list(expr),
            };
            names.iter().filter_map(|n| HttpMethod::parse(n)).collect()
        }
        None => Vec::new(),
    };
    let handler = object_entry(body, "handler").map(|h| segment_of(&unit.masked, h));
    let path = normalize_path(&raw_path);
    for method in methods {
        if let Some(route) = descriptor(unit, opts, method, path.clone(), offset) {
            out.push(RouteSite {
                route,
                middleware: vec![*object],
                handler,
                params: None,
            });
        }
    }
}

/// Literal path of a Nest decorator argument (`'users'` or `{ path: 'users' }`).
fn decorator_paths(args: &[Segment<'_>]) -> Vec<String> {
    let Some(first) = args.first() else {
        return vec![String::new()];
    };
    if let Some(single) = path_literal(first.text) {
        return vec![single];
    }
    let list = string_list(first.text);
    if !list.is_empty() {
        return list;
    }
    strip_braces(first.text)
        .and_then(|body| object_entry(body, "path"))
        .and_then(path_literal)
        .map(|p| vec![p])
        .unwrap_or_else(|| vec![String::new()])
}

/// `@Controller('prefix')` classes with `@Get(':id')` style methods.
fn nest_controllers<'a>(unit: &'a SourceUnit, opts: &ScanOptions, out: &mut Vec<RouteSite<'a>>) {
    let text = unit.masked.as_str();
    for class in classes(text) {
        let Some(controller) = class.decorator("Controller") else {
            continue;
        };
        let prefixes = decorator_paths(&controller.args);
        let Some((open, close)) = class.body else {
            continue;
        };
        for member in class_members(text, open, close) {
            for decorator in &member.decorators {
                if !NEST_METHODS.contains(&decorator.simple_name()) {
                    continue;
                }
                let Some(method) = HttpMethod::parse(decorator.simple_name()) else {
                    continue;
                };
                let middleware: Vec<Segment<'a>> = member
                    .decorators
                    .iter()
                    .filter(|d| d.offset != decorator.offset)
                    .map(|d| Segment {
                        offset: d.offset,
                        text: d.text,
                    })
                    .collect();
                for prefix in &prefixes {
                    for sub in decorator_paths(&decorator.args) {
                        if let Some(route) =
                            descriptor(unit, opts, method, join_paths(prefix, &sub), decorator.offset)
                        {
                            out.push(RouteSite {
                                route,
                                middleware: middleware.clone(),
                                handler: member.body,
                                params: member.params,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Path segments of `unit.path` after the last `dir` segment, when the
/// file lives under it.
fn segments_after<'p>(path: &'p str, dir: &str) -> Option<Vec<&'p str>> {
    let parts: Vec<&str> = path.split(['/', '\\']).collect();
    let idx = parts.iter().rposition(|p| *p == dir)?;
    Some(parts[idx + 1..].to_vec())
}

fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn preceded_by(text: &str, offset: usize, word: &str) -> bool {
    text[..offset].trim_end().ends_with(word)
}

/// Next.js App Router: `app/**/route.ts` exporting `GET`, `POST`, ...
fn next_app_routes<'a>(unit: &'a SourceUnit, opts: &ScanOptions, out: &mut Vec<RouteSite<'a>>) {
    let Some(parts) = segments_after(&unit.path, "app") else {
        return;
    };
    let Some((file, dirs)) = parts.split_last() else {
        return;
    };
    if file_stem(file) != "route" {
        return;
    }
    let path = normalize_path(&dirs.join("/"));
    let text = unit.masked.as_str();

    for function in named_functions(text) {
        if !preceded_by(text, function.offset, "export") {
            continue;
        }
        let Some(method) = HttpMethod::parse(function.name).filter(|_| {
            function.name.chars().all(|c| c.is_ascii_uppercase())
        }) else {
            continue;
        };
        if let Some(route) = descriptor(unit, opts, method, path.clone(), function.offset) {
            out.push(RouteSite {
                route,
                middleware: Vec::new(),
                handler: Some(function.body),
                params: function.params,
            });
        }
    }

    // `export { handler as GET, handler as POST }`
    for caps in EXPORT_ALIAS_RE.captures_iter(text) {
        let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        for item in list.as_str().split(',') {
            let Some(alias) = item.split(" as ").nth(1).map(str::trim) else {
                continue;
            };
            if let Some(method) = HttpMethod::parse(alias) {
                if let Some(route) = descriptor(unit, opts, method, path.clone(), whole.start()) {
                    out.push(RouteSite {
                        route,
                        middleware: Vec::new(),
                        handler: None,
                        params: None,
                    });
                }
            }
        }
    }
}

/// Next.js pages API: `pages/api/**`. Methods come from `req.method`
/// checks, otherwise the route accepts every method.
fn next_pages_routes<'a>(unit: &'a SourceUnit, opts: &ScanOptions, out: &mut Vec<RouteSite<'a>>) {
    let Some(parts) = segments_after(&unit.path, "pages") else {
        return;
    };
    if parts.first() != Some(&"api") {
        return;
    }
    let Some((file, dirs)) = parts.split_last() else {
        return;
    };
    let mut segments: Vec<&str> = dirs.to_vec();
    let stem = file_stem(file);
    if stem != "index" {
        segments.push(stem);
    }
    let path = normalize_path(&segments.join("/"));
    let text = unit.masked.as_str();

    let mut methods: Vec<HttpMethod> = REQ_METHOD_RE
        .captures_iter(text)
        .chain(CASE_METHOD_RE.captures_iter(text))
        .filter_map(|caps| caps.get(1).and_then(|m| HttpMethod::parse(m.as_str())))
        .collect();
    methods.sort();
    methods.dedup();
    if methods.is_empty() {
        methods.push(HttpMethod::All);
    }

    let functions = named_functions(text);
    let (offset, handler) = functions
        .iter()
        .find(|f| preceded_by(text, f.offset, "export default") || f.name == "handler")
        .map(|f| (f.offset, f.body))
        .unwrap_or((0, Segment { offset: 0, text }));

    for method in methods {
        if let Some(route) = descriptor(unit, opts, method, path.clone(), offset) {
            out.push(RouteSite {
                route,
                middleware: Vec::new(),
                handler: Some(handler),
                params: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(path: &str, source: &str) -> Vec<String> {
        let unit = SourceUnit::new(path, source);
        detect_routes(&unit, &ScanOptions::default())
            .into_iter()
            .map(|s| s.route.key())
            .collect()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/users/:userId"), "/users/:id");
        assert_eq!(normalize_path("users/:id?/"), "/users/:id");
        assert_eq!(normalize_path("/files/:name(\\d+)"), "/files/:id");
        assert_eq!(normalize_path("/a//b/?x=1"), "/a/b");
        assert_eq!(normalize_path("/blog/[slug]"), "/blog/:id");
        assert_eq!(normalize_path("/docs/[...parts]"), "/docs/:id");
        assert_eq!(normalize_path("/shop/[[...filters]]"), "/shop/:id");
        assert_eq!(normalize_path("/items/{itemId}"), "/items/:id");
        assert_eq!(normalize_path("/u/<int:pk>/posts"), "/u/:id/posts");
        assert_eq!(normalize_path("/orders/${orderId}/items"), "/orders/:id/items");
        assert_eq!(normalize_path("(marketing)/about"), "/about");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/page#top"), "/page");
    }

    #[test]
    fn test_visibility() {
        let kw: Vec<String> = ["admin", "internal", "metrics"].iter().map(|s| s.to_string()).collect();
        assert_eq!(visibility("/admin/users", &kw), Visibility::Internal);
        assert_eq!(visibility("/api/internal-tools", &kw), Visibility::Internal);
        assert_eq!(visibility("/api/Admin_panel", &kw), Visibility::Internal);
        assert_eq!(visibility("/administrator", &kw), Visibility::Public);
        assert_eq!(visibility("/users/metricsfoo", &kw), Visibility::Public);
    }

    #[test]
    fn test_router_calls_and_client_deny_list() {
        let src = r#"
const router = express.Router();
router.get('/orders', auth, listOrders);
router.post("/orders/:orderId", validate(schema), (req, res) => res.json({ ok: true }));
app.delete(`/orders/${id}`, remove);
axios.get('/remote/thing', { headers });
cache.get('key', fallback);
app.get('port');
router.get('/*', notFound);
"#;
        assert_eq!(
            keys("src/routes/orders.js", src),
            vec!["GET /orders", "POST /orders/:id", "DELETE /orders/:id"]
        );
    }

    #[test]
    fn test_chain_and_fastify_forms() {
        let src = r#"
router.route('/books/:id')
  .get(getBook)
  .put(requireAuth, updateBook);

fastify.route({
  method: ['GET', 'HEAD'],
  url: '/health',
  handler: async (request, reply) => ({ status: 'ok' }),
});
"#;
        assert_eq!(
            keys("src/server.js", src),
            vec!["GET /books/:id", "PUT /books/:id", "GET /health", "HEAD /health"]
        );
    }

    #[test]
    fn test_nest_controller() {
        let src = r#"
@Controller('users')
@UseGuards(JwtAuthGuard)
export class UsersController {
  constructor(private readonly usersService: UsersService) {}

  @Get()
  findAll() { return this.usersService.findAll(); }

  @Roles('admin')
  @Delete(':id')
  remove(@Param('id') id: string) { return this.usersService.remove(id); }
}
"#;
        let unit = SourceUnit::new("src/users/users.controller.ts", src);
        let sites = detect_routes(&unit, &ScanOptions::default());
        let found: Vec<_> = sites.iter().map(|s| s.route.key()).collect();
        assert_eq!(found, vec!["GET /users", "DELETE /users/:id"]);
        assert_eq!(sites[1].middleware.len(), 1);
        assert!(sites[1].middleware[0].text.starts_with("@Roles"));
        assert!(sites[1].params.unwrap().text.contains("@Param"));
    }

    #[test]
    fn test_next_app_router() {
        let src = r#"
export async function GET(request: Request) {
  return NextResponse.json({ items: [] });
}
export const POST = async (req: Request) => {
  const body = await req.json();
  return NextResponse.json({ id: 1 });
};
"#;
        assert_eq!(
            keys("src/app/(shop)/products/[id]/route.ts", src),
            vec!["GET /products/:id", "POST /products/:id"]
        );
        assert!(keys("src/app/products/page.tsx", src).is_empty());
    }

    #[test]
    fn test_next_pages_api() {
        let with_methods = r#"
export default async function handler(req, res) {
  if (req.method === 'POST') { return res.status(201).json({ id: 1 }); }
  if (req.method === "GET") { return res.json([]); }
}
"#;
        assert_eq!(
            keys("pages/api/admin/users/index.ts", with_methods),
            vec!["GET /api/admin/users", "POST /api/admin/users"]
        );
        let any = "export default function handler(req, res) { res.json({ ok: true }) }";
        assert_eq!(keys("src/pages/api/ping.js", any), vec!["ALL /api/ping"]);
    }
}
