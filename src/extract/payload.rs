//! Request and response shape extraction.
//!
//! Request fields come from validation schemas (Joi, zod, yup, Fastify
//! JSON schema), `req.body` usage inside handlers and Nest `@Body()` DTOs.
//! Response fields are the top-level keys of object literals passed to
//! `res.json(..)` and friends.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use super::dialect::{normalize_field, Dialect};
use super::scanner::{
    block_after, call_args, class_members, classes, expression_at, matching_close,
    named_functions, object_entry, split_key_value, split_top_level, string_list,
    string_literal, strip_braces, MemberKind, Segment,
};
use super::types::{FieldMap, FieldRecord, FieldType, PayloadShape};

lazy_static! {
    static ref BINDING_RE: Regex = Regex::new(
        r"(?:\b(?:const|let|var)\s+|\bexports\.|\bmodule\.exports\.)([A-Za-z_$][\w$]*)\s*(?::[^=;\n]+)?=[^=>]"
    )
    .unwrap();
    static ref VALIDATOR_ROOT_RE: Regex =
        Regex::new(r"^(Joi|joi|z|yup|Yup)\s*\.\s*([A-Za-z]+)").unwrap();
    static ref OBJECT_SCHEMA_RE: Regex =
        Regex::new(r"\b(?:Joi|joi|z|yup|Yup)\s*\.\s*object\s*\(").unwrap();
    static ref BODY_DESTRUCTURE_RE: Regex = Regex::new(
        r"\{([^{}]*)\}\s*=\s*(?:await\s+)?(?:req|request|ctx\.request)\s*\.\s*(?:body\b|json\s*\(\s*\))"
    )
    .unwrap();
    static ref BODY_ACCESS_RE: Regex = Regex::new(
        r"\b(?:req|request|ctx\.request)\s*\.\s*body\s*\.\s*([A-Za-z_$][\w$]*)"
    )
    .unwrap();
    static ref RESPONSE_CALL_RE: Regex = Regex::new(
        r"\b(?:(?:res|reply|response|ctx|c)\s*(?:\.\s*(?:status|code)\s*\([^)]*\)\s*)?\.\s*(?:json|send)|NextResponse\s*\.\s*json|Response\s*\.\s*json)\s*\("
    )
    .unwrap();
    static ref RETURN_OBJECT_RE: Regex =
        Regex::new(r"(?:\breturn\s*\(?|=>\s*\()\s*\{").unwrap();
    static ref NEST_BODY_RE: Regex = Regex::new(
        r"@Body\s*\(\s*(?:'([^']*)'|\x22([^\x22]*)\x22)?\s*\)\s*([A-Za-z_$][\w$]*)\s*\??\s*:\s*([A-Za-z_$][\w$<>\[\]]*)"
    )
    .unwrap();
}

/// Method names of validator libraries, mapped onto field types.
static VALIDATOR_TYPES: phf::Map<&'static str, FieldKind> = phf_map! {
    "string" => FieldKind::String,
    "email" => FieldKind::String,
    "uuid" => FieldKind::String,
    "number" => FieldKind::Number,
    "integer" => FieldKind::Number,
    "bigint" => FieldKind::Number,
    "boolean" => FieldKind::Boolean,
    "bool" => FieldKind::Boolean,
    "date" => FieldKind::Date,
    "object" => FieldKind::Json,
    "mixed" => FieldKind::Json,
    "any" => FieldKind::Json,
    "record" => FieldKind::Json,
    "binary" => FieldKind::Binary,
    "array" => FieldKind::Array,
    "enum" => FieldKind::Enum,
    "nativeEnum" => FieldKind::Enum,
};

/// JSON-schema `type` keywords.
static JSON_SCHEMA_TYPES: phf::Map<&'static str, FieldKind> = phf_map! {
    "string" => FieldKind::String,
    "number" => FieldKind::Number,
    "integer" => FieldKind::Number,
    "boolean" => FieldKind::Boolean,
    "object" => FieldKind::Json,
    "array" => FieldKind::Array,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Json,
    Binary,
    Array,
    Enum,
}

impl FieldKind {
    fn field_type(self) -> FieldType {
        match self {
            FieldKind::String => FieldType::String,
            FieldKind::Number => FieldType::Number,
            FieldKind::Boolean => FieldType::Boolean,
            FieldKind::Date => FieldType::Date,
            FieldKind::Json | FieldKind::Array => FieldType::Json,
            FieldKind::Binary => FieldType::Binary,
            FieldKind::Enum => FieldType::Enum(Vec::new()),
        }
    }
}

/// How deep identifier bindings are followed.
const MAX_RESOLVE_DEPTH: usize = 4;

/// Per-file lookup tables used to resolve names referenced by routes.
#[derive(Debug, Default)]
pub struct PayloadContext<'a> {
    /// `const name = <expr>` initializers.
    bindings: BTreeMap<&'a str, &'a str>,
    /// Property-only classes (DTOs), rendered.
    dto_classes: BTreeMap<&'a str, FieldMap>,
    /// Named functions and class methods, by name.
    functions: BTreeMap<&'a str, Segment<'a>>,
}

impl<'a> PayloadContext<'a> {
    pub fn build(text: &'a str) -> Self {
        let mut ctx = PayloadContext::default();

        for caps in BINDING_RE.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            // The regex consumed one char past `=`.
            let eq = whole.as_str().rfind('=').unwrap_or(0);
            let init = expression_at(text, whole.start() + eq + 1);
            if !init.text.is_empty() {
                ctx.bindings.entry(name.as_str()).or_insert(init.text);
            }
        }

        for function in named_functions(text) {
            ctx.functions.entry(function.name).or_insert(function.body);
        }

        for class in classes(text) {
            let Some((open, close)) = class.body else {
                continue;
            };
            let mut fields = FieldMap::new();
            for member in class_members(text, open, close) {
                match member.kind {
                    MemberKind::Property if member.body.is_none() => {
                        if let Some(field) = normalize_field(Dialect::DecoratedClass, member.text) {
                            fields.entry(field.name.clone()).or_insert_with(|| field.describe());
                        }
                    }
                    _ => {
                        if let Some(body) = member.body {
                            ctx.functions.entry(member.name).or_insert(body);
                        }
                    }
                }
            }
            if !fields.is_empty() {
                ctx.dto_classes.insert(class.name, fields);
            }
        }
        ctx
    }

    /// Initializer of a same-file `const`/`let`/`var` binding.
    pub fn binding(&self, name: &str) -> Option<&'a str> {
        self.bindings.get(name).copied()
    }

    /// Body of a same-file handler referenced by name (`createOrder`,
    /// `ordersController.create`).
    pub fn handler_body(&self, expr: &str) -> Option<Segment<'a>> {
        let name = expr.trim().rsplit('.').next()?.trim();
        self.functions.get(name).copied()
    }

    /// Follow identifier bindings (`schema`, `schemas.create`) to the
    /// expression they name.
    fn resolve<'e>(&self, expr: &'e str, depth: usize) -> &'e str
    where
        'a: 'e,
    {
        let expr = expr.trim();
        if depth >= MAX_RESOLVE_DEPTH || !is_ident_path(expr) {
            return expr;
        }
        let mut parts = expr.split('.');
        let Some(root) = parts.next().and_then(|head| self.bindings.get(head).copied()) else {
            return expr;
        };
        let mut current: &'e str = root;
        for part in parts {
            match strip_braces(current).and_then(|body| object_entry(body, part)) {
                Some(value) => current = value,
                None => return expr,
            }
        }
        self.resolve(current, depth + 1)
    }
}

fn is_ident_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
                && !part.starts_with(|c: char| c.is_ascii_digit())
        })
}

// ---------------------------------------------------------------------------
// Validation schemas

/// Field map of a Joi / zod / yup object schema expression, following
/// same-file bindings.
pub fn schema_fields<'a>(expr: &'a str, ctx: &PayloadContext<'a>) -> Option<FieldMap> {
    let expr = ctx.resolve(expr, 0);
    let m = OBJECT_SCHEMA_RE.find(expr)?;
    let open = m.end() - 1;
    let (args, close) = call_args(expr, open)?;
    let body = match args.first().and_then(|a| strip_braces(a.text)) {
        Some(body) => body,
        // yup.object().shape({..}) / Joi.object().keys({..})
        None => {
            let (bo, bc) = block_after(expr, close, b'{')?;
            &expr[bo + 1..bc]
        }
    };

    let mut fields = FieldMap::new();
    for entry in split_top_level(body, b',') {
        let Some((name, value)) = split_key_value(entry.text) else {
            continue;
        };
        let field = validator_field(&name, value, ctx);
        fields.entry(name).or_insert_with(|| field.describe());
    }
    Some(fields)
}

fn validator_field<'a>(name: &str, value: &'a str, ctx: &PayloadContext<'a>) -> FieldRecord {
    let value = value.trim();
    let mut field = FieldRecord::new(name, FieldType::Unknown);

    let Some(caps) = VALIDATOR_ROOT_RE.captures(value) else {
        // A reference to another schema or a plain value.
        if is_ident_path(value) && schema_fields(value, ctx).is_some() {
            field.field_type = FieldType::Json;
        }
        return field;
    };
    let lib = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let method = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let kind = VALIDATOR_TYPES.get(method).copied();

    match kind {
        Some(FieldKind::Array) => {
            field.is_array = true;
            // z.array(z.string()) / Joi.array().items(Joi.string()) / yup.array().of(..)
            let inner = value
                .find('(')
                .and_then(|open| call_args(value, open))
                .and_then(|(args, _)| args.first().map(|a| a.text))
                .filter(|a| !a.is_empty())
                .or_else(|| chained_arg(value, &["items", "of"]));
            field.field_type = inner
                .map(|inner| validator_field(name, inner, ctx).field_type)
                .unwrap_or(FieldType::Json);
        }
        Some(FieldKind::Enum) => {
            let values = value
                .find('(')
                .and_then(|open| call_args(value, open))
                .and_then(|(args, _)| args.first().map(|a| string_list(a.text)))
                .unwrap_or_default();
            field.field_type = FieldType::Enum(values);
        }
        Some(kind) => field.field_type = kind.field_type(),
        None => field.field_type = FieldType::Other(method.to_string()),
    }

    // Joi `.valid('a', 'b')` / yup `.oneOf(['a', 'b'])` narrow a string.
    if field.field_type == FieldType::String {
        if let Some(args) = chained_args(value, &["valid", "oneOf", "allow"]) {
            let values: Vec<String> = args
                .iter()
                .flat_map(|a| match string_literal(a) {
                    Some(v) => vec![v],
                    None => string_list(a),
                })
                .collect();
            if !values.is_empty() {
                field.field_type = FieldType::Enum(values);
            }
        }
    }

    // zod fields are required unless marked optional; Joi and yup the reverse.
    field.required = if lib == "z" {
        !(value.contains(".optional(") || value.contains(".nullish("))
    } else {
        value.contains(".required(")
    };
    field.default = chained_arg(value, &["default"]).map(str::to_string);
    field
}

/// Arguments of the first `.name(..)` call in a method chain.
fn chained_args<'v>(value: &'v str, names: &[&str]) -> Option<Vec<&'v str>> {
    for name in names {
        let needle = format!(".{}(", name);
        if let Some(idx) = value.find(&needle) {
            let open = idx + needle.len() - 1;
            let (args, _) = call_args(value, open)?;
            return Some(args.into_iter().map(|a| a.text).collect());
        }
    }
    None
}

fn chained_arg<'v>(value: &'v str, names: &[&str]) -> Option<&'v str> {
    chained_args(value, names).and_then(|args| args.into_iter().next())
}

// ---------------------------------------------------------------------------
// JSON schema (Fastify)

fn json_schema_fields<'a>(schema: &'a str, ctx: &PayloadContext<'a>) -> FieldMap {
    let resolved = ctx.resolve(schema, 0);
    let mut fields = FieldMap::new();
    let Some(body) = strip_braces(resolved) else {
        return fields;
    };
    let required = object_entry(body, "required")
        .map(string_list)
        .unwrap_or_default();
    let Some(properties) = object_entry(body, "properties").and_then(strip_braces) else {
        return fields;
    };
    for entry in split_top_level(properties, b',') {
        let Some((name, value)) = split_key_value(entry.text) else {
            continue;
        };
        let mut field = json_schema_field(&name, value);
        field.required = required.iter().any(|r| *r == name);
        fields.entry(name).or_insert_with(|| field.describe());
    }
    fields
}

fn json_schema_field(name: &str, value: &str) -> FieldRecord {
    let mut field = FieldRecord::new(name, FieldType::Unknown);
    let Some(body) = strip_braces(value) else {
        return field;
    };
    let kind = object_entry(body, "type")
        .and_then(string_literal)
        .and_then(|t| JSON_SCHEMA_TYPES.get(t.as_str()).copied());
    field.field_type = match kind {
        Some(FieldKind::Array) => {
            field.is_array = true;
            object_entry(body, "items")
                .map(|items| json_schema_field(name, items).field_type)
                .unwrap_or(FieldType::Json)
        }
        Some(FieldKind::String) => match object_entry(body, "format").and_then(string_literal) {
            Some(f) if f.starts_with("date") => FieldType::Date,
            _ => FieldType::String,
        },
        Some(kind) => kind.field_type(),
        None => FieldType::Unknown,
    };
    if let Some(values) = object_entry(body, "enum").map(string_list).filter(|v| !v.is_empty()) {
        field.field_type = FieldType::Enum(values);
    }
    field.default = object_entry(body, "default").map(|d| d.trim().to_string());
    field
}

// ---------------------------------------------------------------------------
// Contributions

/// Request/response fields carried by one middleware argument, decorator
/// or route options object.
pub fn payload_from_middleware<'a>(expr: &'a str, ctx: &PayloadContext<'a>) -> PayloadShape {
    let mut shape = PayloadShape::default();
    let expr = expr.trim();

    // Fastify options object: { schema: { body, response }, preHandler }
    if let Some(body) = strip_braces(expr) {
        if let Some(schema) = object_entry(body, "schema") {
            if let Some(schema_body) = strip_braces(ctx.resolve(schema, 0)) {
                if let Some(request) = object_entry(schema_body, "body") {
                    shape.request = json_schema_fields(request, ctx);
                }
                if let Some(responses) = object_entry(schema_body, "response").and_then(strip_braces) {
                    let success = split_top_level(responses, b',')
                        .into_iter()
                        .filter_map(|e| split_key_value(e.text))
                        .find(|(code, _)| code.starts_with('2'));
                    if let Some((_, response)) = success {
                        shape.response = json_schema_fields(response, ctx);
                    }
                }
            }
        }
        return shape;
    }

    // validate(schema) / validateBody(schema) / celebrate({ body: schema })
    let Some(open) = expr.find('(') else {
        return shape;
    };
    let callee = expr[..open].trim().to_ascii_lowercase();
    if !(callee.contains("valid") || callee.contains("celebrate") || callee.contains("schema")) {
        return shape;
    }
    let Some((args, _)) = call_args(expr, open) else {
        return shape;
    };
    for arg in args {
        let target = match strip_braces(arg.text) {
            Some(body) => split_top_level(body, b',')
                .into_iter()
                .find_map(|e| {
                    let (key, value) = e.text.split_once(':')?;
                    key.to_ascii_lowercase().contains("body").then_some(value)
                }),
            None => Some(arg.text),
        };
        if let Some(fields) = target.and_then(|t| schema_fields(t, ctx)) {
            shape.request = fields;
            break;
        }
    }
    shape
}

/// Request fields read from `req.body` inside a handler body.
pub fn request_from_handler(body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for caps in BODY_DESTRUCTURE_RE.captures_iter(body) {
        let Some(list) = caps.get(1) else {
            continue;
        };
        for item in split_top_level(list.as_str(), b',') {
            let item = item.text;
            if item.starts_with("...") {
                continue;
            }
            let name = item
                .split([':', '='])
                .next()
                .map(str::trim)
                .unwrap_or_default();
            if is_ident_path(name) && !name.contains('.') {
                let mut field = FieldRecord::new(name, FieldType::Unknown);
                if let Some((_, default)) = item.split_once('=') {
                    field.default = Some(default.trim().to_string());
                }
                fields.entry(name.to_string()).or_insert_with(|| field.describe());
            }
        }
    }
    for caps in BODY_ACCESS_RE.captures_iter(body) {
        if let Some(name) = caps.get(1) {
            fields
                .entry(name.as_str().to_string())
                .or_insert_with(|| FieldRecord::new(name.as_str(), FieldType::Unknown).describe());
        }
    }
    fields
}

/// Request fields of a decorated handler's `@Body()` parameters.
pub fn request_from_params(params: &str, ctx: &PayloadContext<'_>) -> FieldMap {
    let mut fields = FieldMap::new();
    for caps in NEST_BODY_RE.captures_iter(params) {
        let key = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        let type_name = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
        match key {
            // @Body('email') email: string
            Some(key) if !key.is_empty() => {
                let raw = format!("{}: {};", key, type_name);
                if let Some(field) = normalize_field(Dialect::DecoratedClass, &raw) {
                    fields.entry(key.to_string()).or_insert_with(|| field.describe());
                }
            }
            _ => {
                let class_name = type_name.trim_end_matches("[]");
                if let Some(dto) = ctx.dto_classes.get(class_name) {
                    for (name, description) in dto {
                        fields.entry(name.clone()).or_insert_with(|| description.clone());
                    }
                }
            }
        }
    }
    fields
}

/// Type of a literal value in a response object.
fn literal_type(value: &str) -> FieldRecord {
    let value = value.trim();
    let mut field = FieldRecord::new("", FieldType::Unknown);
    field.field_type = if string_literal(value).is_some() || value.starts_with('`') {
        FieldType::String
    } else if value == "true" || value == "false" {
        FieldType::Boolean
    } else if value.parse::<f64>().is_ok() {
        FieldType::Number
    } else if value.starts_with("new Date") {
        FieldType::Date
    } else if value.starts_with('{') {
        FieldType::Json
    } else if value.starts_with('[') {
        field.is_array = true;
        FieldType::Json
    } else {
        FieldType::Unknown
    };
    field
}

fn object_keys(object: &str, fields: &mut FieldMap) {
    let Some(body) = strip_braces(object) else {
        return;
    };
    for entry in split_top_level(body, b',') {
        let text = entry.text;
        if text.starts_with("...") {
            continue;
        }
        let (name, field) = match split_key_value(text) {
            Some((name, value)) => {
                let mut field = literal_type(value);
                field.name = name.clone();
                (name, field)
            }
            // Shorthand `{ user }`.
            None if is_ident_path(text) && !text.contains('.') => {
                (text.to_string(), FieldRecord::new(text, FieldType::Unknown))
            }
            None => continue,
        };
        fields.entry(name).or_insert_with(|| field.describe());
    }
}

/// Response fields written by a handler body.
pub fn response_from_handler(body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for m in RESPONSE_CALL_RE.find_iter(body) {
        let open = m.end() - 1;
        if let Some((args, _)) = call_args(body, open) {
            if let Some(first) = args.first() {
                object_keys(first.text, &mut fields);
            }
        }
    }
    for m in RETURN_OBJECT_RE.find_iter(body) {
        let open = m.end() - 1;
        if let Some(close) = matching_close(body, open) {
            object_keys(&body[open..=close], &mut fields);
        }
    }
    fields
}
