//! Core fact types shared by the extractors and the aggregator.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name -> rendered field description (`"String (required)"`).
pub type FieldMap = BTreeMap<String, String>;

/// Route key in `"METHOD /path"` form.
pub type RouteKey = String;

/// Kind of discovered architectural element. Also used as the role hint
/// for name canonicalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Service,
    Controller,
    Model,
    Route,
    FlowStep,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Controller => "controller",
            EntityKind::Model => "model",
            EntityKind::Route => "route",
            EntityKind::FlowStep => "flow-step",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized field type. Closed vocabulary plus a verbatim pass-through
/// for type tokens no dialect table knows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Json,
    Binary,
    Enum(Vec<String>),
    Other(String),
    /// No type token was found at all.
    Unknown,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Number => write!(f, "Number"),
            FieldType::Boolean => write!(f, "Boolean"),
            FieldType::Date => write!(f, "Date"),
            FieldType::ObjectId => write!(f, "ObjectId"),
            FieldType::Json => write!(f, "JSON"),
            FieldType::Binary => write!(f, "Binary"),
            FieldType::Enum(values) if values.is_empty() => write!(f, "Enum"),
            FieldType::Enum(values) => write!(f, "Enum({})", values.join("|")),
            FieldType::Other(raw) => write!(f, "{}", raw),
            FieldType::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One normalized schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Raw textual default, unparsed.
    pub default: Option<String>,
    pub is_array: bool,
}

impl FieldRecord {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            is_array: false,
        }
    }

    /// A record carrying no information beyond its name.
    pub fn is_empty(&self) -> bool {
        self.field_type == FieldType::Unknown && !self.required && self.default.is_none()
    }

    /// Rendered form used in every field map.
    pub fn describe(&self) -> String {
        let mut out = self.field_type.to_string();
        if self.is_array {
            out.push_str("[]");
        }
        let mut modifiers = Vec::new();
        if self.required {
            modifiers.push("required".to_string());
        }
        if let Some(default) = &self.default {
            modifiers.push(format!("default: {}", default));
        }
        if !modifiers.is_empty() {
            out.push_str(&format!(" ({})", modifiers.join(", ")));
        }
        out
    }
}

/// The field table of one model declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSchema {
    pub fields: BTreeMap<String, FieldRecord>,
}

impl ModelSchema {
    /// Detailed (per-field object form) definitions. A later non-empty
    /// definition replaces an earlier one.
    pub fn absorb_detailed(&mut self, field: FieldRecord) {
        match self.fields.get(&field.name) {
            Some(_) if field.is_empty() => {}
            _ => {
                self.fields.insert(field.name.clone(), field);
            }
        }
    }

    /// Simple one-line definitions never overwrite an existing field.
    pub fn absorb_simple(&mut self, field: FieldRecord) {
        self.fields.entry(field.name.clone()).or_insert(field);
    }

    /// Merge a later declaration of the same model: per field, the later
    /// non-empty definition wins.
    pub fn overlay(&mut self, later: ModelSchema) {
        for (_, field) in later.fields {
            self.absorb_detailed(field);
        }
    }

    pub fn field_map(&self) -> FieldMap {
        self.fields
            .iter()
            .map(|(name, f)| (name.clone(), f.describe()))
            .collect()
    }
}

/// HTTP verbs recognized on route declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    All,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::All => "ALL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" | "DEL" => Some(HttpMethod::Delete),
            "OPTIONS" => Some(HttpMethod::Options),
            "HEAD" => Some(HttpMethod::Head),
            "ALL" | "ANY" => Some(HttpMethod::All),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Internal,
}

/// One route declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: HttpMethod,
    /// Normalized path.
    pub path: String,
    pub visibility: Visibility,
    /// Byte offset of the declaration; only meaningful inside its file.
    pub offset: usize,
    pub line: usize,
}

impl RouteDescriptor {
    pub fn key(&self) -> RouteKey {
        format!("{} {}", self.method, self.path)
    }
}

/// Authorization requirement attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthPolicy {
    Authenticated,
    AdminOnly,
    Role(String),
    Permission(String),
    JwtRequired,
    ApiKey,
    Custom,
}

impl fmt::Display for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPolicy::Authenticated => write!(f, "Authenticated"),
            AuthPolicy::AdminOnly => write!(f, "AdminOnly"),
            AuthPolicy::Role(name) => write!(f, "Role:{}", name),
            AuthPolicy::Permission(name) => write!(f, "Permission:{}", name),
            AuthPolicy::JwtRequired => write!(f, "JWT Required"),
            AuthPolicy::ApiKey => write!(f, "API Key"),
            AuthPolicy::Custom => write!(f, "Custom"),
        }
    }
}

/// Request and response field maps of one route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadShape {
    pub request: FieldMap,
    pub response: FieldMap,
}

impl PayloadShape {
    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }
}

/// Everything associated with one route key inside one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationRecord {
    pub auth: Option<AuthPolicy>,
    pub payload: PayloadShape,
}

/// Service category used for the business/utility split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    #[default]
    Business,
    Utility,
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCategory::Business => write!(f, "business"),
            ServiceCategory::Utility => write!(f, "utility"),
        }
    }
}

/// Kind-specific payload of an [`Entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityAttributes {
    Service { category: ServiceCategory },
    /// Route prefix of a decorated controller, when declared.
    Controller { prefix: Option<String> },
    Model { schema: ModelSchema },
    Route { route: RouteDescriptor },
    FlowStep { service: String, method: String, target: String },
}

/// One discovered architectural element.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub canonical_name: String,
    pub source_file: String,
    pub line: usize,
    pub attributes: EntityAttributes,
}

/// Immutable result of scanning one file.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    /// Path relative to the scan root.
    pub path: String,
    pub services: BTreeMap<String, ServiceCategory>,
    pub models: BTreeMap<String, ModelSchema>,
    pub routes: Vec<RouteDescriptor>,
    pub associations: BTreeMap<RouteKey, AssociationRecord>,
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
    pub flows: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl FileFacts {
    pub fn empty(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
            && self.models.is_empty()
            && self.routes.is_empty()
            && self.associations.is_empty()
            && self.dependencies.is_empty()
            && self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_field() {
        let mut f = FieldRecord::new("status", FieldType::String);
        assert_eq!(f.describe(), "String");
        f.required = true;
        assert_eq!(f.describe(), "String (required)");
        f.default = Some("'active'".to_string());
        f.is_array = true;
        assert_eq!(f.describe(), "String[] (required, default: 'active')");

        let e = FieldRecord::new(
            "role",
            FieldType::Enum(vec!["user".to_string(), "admin".to_string()]),
        );
        assert_eq!(e.describe(), "Enum(user|admin)");
    }

    #[test]
    fn test_simple_never_overwrites_detailed() {
        let mut schema = ModelSchema::default();
        let mut detailed = FieldRecord::new("status", FieldType::String);
        detailed.required = true;
        schema.absorb_detailed(detailed);
        schema.absorb_simple(FieldRecord::new("status", FieldType::String));
        assert_eq!(schema.field_map()["status"], "String (required)");
    }

    #[test]
    fn test_overlay_later_non_empty_wins() {
        let mut first = ModelSchema::default();
        first.absorb_detailed(FieldRecord::new("age", FieldType::String));
        first.absorb_detailed(FieldRecord::new("name", FieldType::String));

        let mut second = ModelSchema::default();
        second.absorb_detailed(FieldRecord::new("age", FieldType::Number));
        second.absorb_detailed(FieldRecord::new("name", FieldType::Unknown));

        first.overlay(second);
        assert_eq!(first.field_map()["age"], "Number");
        assert_eq!(first.field_map()["name"], "String");
    }

    #[test]
    fn test_route_key() {
        let r = RouteDescriptor {
            method: HttpMethod::Post,
            path: "/orders/:id/cancel".to_string(),
            visibility: Visibility::Public,
            offset: 0,
            line: 1,
        };
        assert_eq!(r.key(), "POST /orders/:id/cancel");
        assert_eq!(AuthPolicy::Role("editor".into()).to_string(), "Role:editor");
        assert_eq!(AuthPolicy::JwtRequired.to_string(), "JWT Required");
    }
}
