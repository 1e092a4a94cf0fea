//! Field normalization across schema-declaration dialects.
//!
//! Four dialects are funneled into one [`FieldRecord`] shape:
//!
//! | Dialect | Typical source | Fragment |
//! |---|---|---|
//! | `DocumentSchema` | Mongoose `new Schema({..})` | `email: { type: String, required: true }` |
//! | `RelationalDefine` | Sequelize `define` / `init` | `email: { type: DataTypes.STRING, allowNull: false }` |
//! | `DeclarativeModel` | Prisma `model X {..}` | `email String? @unique` |
//! | `DecoratedClass` | TypeORM / Nest / class-validator | `@Column({ nullable: true }) email?: string;` |
//!
//! Type tokens no table knows are passed through verbatim so extraction
//! gaps stay visible; `Unknown` means no type token was present at all.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use phf::phf_map;
use regex::Regex;

use super::scanner::{
    call_args, decorator_run, mask_comments, matching_close, object_entry, skip_ws,
    split_key_value, split_top_level, string_list, string_literal, strip_braces,
};
use super::types::{FieldRecord, FieldType, ModelSchema};

/// A schema-declaration grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    DocumentSchema,
    RelationalDefine,
    DeclarativeModel,
    DecoratedClass,
}

/// Vocabulary entries that fit in a static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base {
    String,
    Number,
    Boolean,
    Date,
    ObjectId,
    Json,
    Binary,
    Enum,
}

impl Base {
    fn into_type(self, values: Vec<String>) -> FieldType {
        match self {
            Base::String => FieldType::String,
            Base::Number => FieldType::Number,
            Base::Boolean => FieldType::Boolean,
            Base::Date => FieldType::Date,
            Base::ObjectId => FieldType::ObjectId,
            Base::Json => FieldType::Json,
            Base::Binary => FieldType::Binary,
            Base::Enum => FieldType::Enum(values),
        }
    }
}

static DOCUMENT_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "String" => Base::String,
    "Number" => Base::Number,
    "Boolean" => Base::Boolean,
    "Date" => Base::Date,
    "Buffer" => Base::Binary,
    "ObjectId" => Base::ObjectId,
    "Mixed" => Base::Json,
    "Map" => Base::Json,
    "Object" => Base::Json,
    "Array" => Base::Json,
    "Decimal128" => Base::Number,
    "BigInt" => Base::Number,
    "UUID" => Base::String,
};

/// Keys are upper-case.
static RELATIONAL_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "STRING" => Base::String,
    "TEXT" => Base::String,
    "CHAR" => Base::String,
    "CITEXT" => Base::String,
    "UUID" => Base::String,
    "UUIDV4" => Base::String,
    "INTEGER" => Base::Number,
    "BIGINT" => Base::Number,
    "FLOAT" => Base::Number,
    "DOUBLE" => Base::Number,
    "DECIMAL" => Base::Number,
    "REAL" => Base::Number,
    "NUMBER" => Base::Number,
    "SMALLINT" => Base::Number,
    "TINYINT" => Base::Number,
    "MEDIUMINT" => Base::Number,
    "BOOLEAN" => Base::Boolean,
    "DATE" => Base::Date,
    "DATEONLY" => Base::Date,
    "TIME" => Base::Date,
    "NOW" => Base::Date,
    "JSON" => Base::Json,
    "JSONB" => Base::Json,
    "BLOB" => Base::Binary,
    "ENUM" => Base::Enum,
};

static PRISMA_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "String" => Base::String,
    "Int" => Base::Number,
    "Float" => Base::Number,
    "Decimal" => Base::Number,
    "BigInt" => Base::Number,
    "Boolean" => Base::Boolean,
    "DateTime" => Base::Date,
    "Json" => Base::Json,
    "Bytes" => Base::Binary,
};

/// Column types given as strings to column decorators. Keys are lower-case.
static SQL_COLUMN_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "varchar" => Base::String,
    "character varying" => Base::String,
    "text" => Base::String,
    "char" => Base::String,
    "uuid" => Base::String,
    "citext" => Base::String,
    "int" => Base::Number,
    "integer" => Base::Number,
    "int4" => Base::Number,
    "int8" => Base::Number,
    "bigint" => Base::Number,
    "smallint" => Base::Number,
    "float" => Base::Number,
    "double" => Base::Number,
    "double precision" => Base::Number,
    "decimal" => Base::Number,
    "numeric" => Base::Number,
    "real" => Base::Number,
    "bool" => Base::Boolean,
    "boolean" => Base::Boolean,
    "date" => Base::Date,
    "datetime" => Base::Date,
    "timestamp" => Base::Date,
    "timestamptz" => Base::Date,
    "time" => Base::Date,
    "json" => Base::Json,
    "jsonb" => Base::Json,
    "simple-json" => Base::Json,
    "simple-array" => Base::Json,
    "bytea" => Base::Binary,
    "blob" => Base::Binary,
    "enum" => Base::Enum,
    "simple-enum" => Base::Enum,
};

static TS_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "string" => Base::String,
    "String" => Base::String,
    "number" => Base::Number,
    "Number" => Base::Number,
    "bigint" => Base::Number,
    "boolean" => Base::Boolean,
    "Boolean" => Base::Boolean,
    "Date" => Base::Date,
    "object" => Base::Json,
    "Object" => Base::Json,
    "Record" => Base::Json,
    "any" => Base::Json,
    "unknown" => Base::Json,
    "Buffer" => Base::Binary,
    "ObjectId" => Base::ObjectId,
    "Types.ObjectId" => Base::ObjectId,
    "mongoose.Types.ObjectId" => Base::ObjectId,
};

/// class-validator decorators that imply a type.
static VALIDATOR_TYPES: phf::Map<&'static str, Base> = phf_map! {
    "IsString" => Base::String,
    "IsEmail" => Base::String,
    "IsUUID" => Base::String,
    "IsUrl" => Base::String,
    "IsInt" => Base::Number,
    "IsNumber" => Base::Number,
    "IsPositive" => Base::Number,
    "IsBoolean" => Base::Boolean,
    "IsDate" => Base::Date,
    "IsDateString" => Base::Date,
    "IsObject" => Base::Json,
    "IsMongoId" => Base::ObjectId,
    "IsEnum" => Base::Enum,
    "IsIn" => Base::Enum,
};

/// Decorators marking generated or relation columns; never required input.
const GENERATED_DECORATORS: &[&str] = &[
    "PrimaryGeneratedColumn",
    "CreateDateColumn",
    "UpdateDateColumn",
    "DeleteDateColumn",
    "VersionColumn",
    "OneToMany",
    "ManyToOne",
    "OneToOne",
    "ManyToMany",
    "HasMany",
    "BelongsTo",
    "HasOne",
    "BelongsToMany",
];

/// Decorators whose options follow the TypeORM column convention.
const COLUMN_DECORATORS: &[&str] = &["Column", "PrimaryColumn", "ObjectIdColumn"];

lazy_static! {
    static ref PROPERTY_RE: Regex = Regex::new(
        r"^(?:(?:public|private|protected|readonly|declare|static|override)\s+)*([A-Za-z_$][\w$]*)\s*([?!])?\s*(?::\s*([^=;]+?))?\s*(?:=\s*([^;]+?))?\s*;?\s*$"
    ).unwrap();
}

/// Normalize one raw field fragment. `None` when no field name is found.
pub fn normalize_field(dialect: Dialect, raw: &str) -> Option<FieldRecord> {
    match dialect {
        Dialect::DocumentSchema => {
            let (name, value) = split_key_value(raw)?;
            Some(document_field(&name, value))
        }
        Dialect::RelationalDefine => {
            let (name, value) = split_key_value(raw)?;
            Some(relational_field(&name, value))
        }
        Dialect::DeclarativeModel => prisma_field(raw),
        Dialect::DecoratedClass => decorated_field(raw),
    }
}

/// Whether an object-literal entry uses the detailed per-field object form.
pub fn is_detailed(raw: &str) -> bool {
    match split_key_value(raw) {
        Some((_, value)) => {
            let v = value.trim_start();
            v.starts_with('{') || v.trim_start_matches('[').trim_start().starts_with('{')
        }
        None => false,
    }
}

/// Replace pass-through type names that name a same-file enum.
pub fn resolve_enums(schema: &mut ModelSchema, enums: &BTreeMap<String, Vec<String>>) {
    for field in schema.fields.values_mut() {
        let resolved = match &field.field_type {
            FieldType::Other(name) => enums.get(name).cloned(),
            _ => None,
        };
        if let Some(values) = resolved {
            field.field_type = FieldType::Enum(values);
        }
    }
}

/// Last `.`-separated segment of a type expression, without call args.
fn type_token(expr: &str) -> &str {
    let head = match expr.find('(') {
        Some(idx) => &expr[..idx],
        None => expr,
    };
    head.trim().rsplit('.').next().unwrap_or("").trim()
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Map a type token through a table; unmapped tokens pass through.
fn lookup(table: &phf::Map<&'static str, Base>, token: &str, values: Vec<String>) -> FieldType {
    if token.is_empty() {
        return FieldType::Unknown;
    }
    match table.get(token) {
        Some(base) => base.into_type(values),
        None => FieldType::Other(token.to_string()),
    }
}

fn is_true(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        Some("true") => true,
        Some(v) if v.starts_with('[') => split_top_level(&v[1..], b',')
            .first()
            .map(|s| s.text.trim_end_matches(']').trim() == "true")
            .unwrap_or(false),
        _ => false,
    }
}

fn is_false(value: Option<&str>) -> bool {
    value.map(str::trim) == Some("false")
}

fn raw_default(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Document schema

fn document_field(name: &str, value: &str) -> FieldRecord {
    let mut field = FieldRecord::new(name, FieldType::Unknown);
    let value = value.trim();

    if let Some(rest) = value.strip_prefix('[') {
        let inner = rest.trim_end().trim_end_matches(']').trim();
        if inner.is_empty() {
            field.field_type = FieldType::Json;
        } else {
            let element = document_field(name, inner);
            field = element;
        }
        field.is_array = true;
        return field;
    }

    if let Some(body) = strip_braces(value) {
        match object_entry(body, "type") {
            Some(type_expr) => {
                let typed = document_field(name, type_expr);
                field.field_type = typed.field_type;
                field.is_array = typed.is_array;
            }
            // A nested sub-document without `type`.
            None => field.field_type = FieldType::Json,
        }
        field.required = is_true(object_entry(body, "required"));
        field.default = raw_default(object_entry(body, "default"));

        if let Some(enum_expr) = object_entry(body, "enum") {
            let values = match strip_braces(enum_expr) {
                Some(inner) => object_entry(inner, "values").map(string_list).unwrap_or_default(),
                None => string_list(enum_expr),
            };
            if matches!(field.field_type, FieldType::String | FieldType::Unknown) {
                field.field_type = FieldType::Enum(values);
            }
        }
        return field;
    }

    let token = type_token(value);
    field.field_type = if is_identifier(token) {
        lookup(&DOCUMENT_TYPES, token, Vec::new())
    } else if value.is_empty() {
        FieldType::Unknown
    } else {
        FieldType::Other(value.to_string())
    };
    field
}

// ---------------------------------------------------------------------------
// Relational define

fn relational_type(expr: &str) -> (FieldType, bool) {
    let expr = expr.trim();
    let token = type_token(expr).to_ascii_uppercase();
    let args = expr
        .find('(')
        .and_then(|open| call_args(expr, open))
        .map(|(args, _)| args.iter().map(|a| a.text.to_string()).collect::<Vec<_>>())
        .unwrap_or_default();

    if token == "ARRAY" {
        let (inner, _) = args
            .first()
            .map(|a| relational_type(a))
            .unwrap_or((FieldType::Unknown, false));
        return (inner, true);
    }

    if !is_identifier(&token) {
        return if expr.is_empty() {
            (FieldType::Unknown, false)
        } else {
            (FieldType::Other(expr.to_string()), false)
        };
    }

    let values = if token == "ENUM" {
        args.iter().filter_map(|a| string_literal(a)).collect()
    } else {
        Vec::new()
    };
    match RELATIONAL_TYPES.get(token.as_str()) {
        Some(base) => (base.into_type(values), false),
        // Preserve the original spelling for pass-through.
        None => (FieldType::Other(type_token(expr).to_string()), false),
    }
}

fn relational_field(name: &str, value: &str) -> FieldRecord {
    let mut field = FieldRecord::new(name, FieldType::Unknown);
    match strip_braces(value) {
        Some(body) => {
            if let Some(type_expr) = object_entry(body, "type") {
                let (ty, is_array) = relational_type(type_expr);
                field.field_type = ty;
                field.is_array = is_array;
            }
            if let FieldType::Enum(values) = &mut field.field_type {
                if values.is_empty() {
                    *values = object_entry(body, "values").map(string_list).unwrap_or_default();
                }
            }
            field.required = is_false(object_entry(body, "allowNull"))
                || is_true(object_entry(body, "primaryKey"));
            field.default = raw_default(object_entry(body, "defaultValue"));
        }
        None => {
            let (ty, is_array) = relational_type(value);
            field.field_type = ty;
            field.is_array = is_array;
        }
    }
    field
}

// ---------------------------------------------------------------------------
// Declarative model language

fn prisma_field(raw: &str) -> Option<FieldRecord> {
    let line = mask_comments(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with('@') {
        return None;
    }
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    if !is_identifier(name) {
        return None;
    }
    let mut field = FieldRecord::new(name, FieldType::Unknown);

    if let Some(type_tok) = parts.next().filter(|t| !t.starts_with('@')) {
        let mut token = type_tok;
        let optional = token.ends_with('?');
        token = token.trim_end_matches('?');
        if let Some(stripped) = token.strip_suffix("[]") {
            field.is_array = true;
            token = stripped;
        }
        field.field_type = lookup(&PRISMA_TYPES, token, Vec::new());
        field.required = !optional && !field.is_array;
    }

    if let Some(idx) = line.find("@default(") {
        let open = idx + "@default".len();
        if let Some(close) = matching_close(line, open) {
            field.default = raw_default(Some(&line[open + 1..close]));
        }
    }
    Some(field)
}

// ---------------------------------------------------------------------------
// Decorated class property

#[derive(Debug)]
struct Decorator<'a> {
    name: &'a str,
    args: Vec<&'a str>,
}

impl<'a> Decorator<'a> {
    /// Value of a key in the first object-literal argument.
    fn option(&self, key: &str) -> Option<&'a str> {
        self.args
            .iter()
            .find_map(|a| strip_braces(*a))
            .and_then(|body| object_entry(body, key))
    }

    fn simple_name(&self) -> &'a str {
        self.name.rsplit('.').next().unwrap_or(self.name)
    }
}

/// Split leading decorators off a property fragment.
fn parse_decorators(raw: &str) -> (Vec<Decorator<'_>>, &str) {
    let (calls, end) = decorator_run(raw, skip_ws(raw, 0));
    let decorators = calls
        .into_iter()
        .map(|call| Decorator {
            name: call.name,
            args: call.args.into_iter().map(|seg| seg.text).collect(),
        })
        .collect();
    (decorators, &raw[end..])
}

/// TS annotation -> (type, is_array, nullable).
fn ts_type(annotation: &str) -> (FieldType, bool, bool) {
    let mut nullable = false;
    let mut members: Vec<&str> = Vec::new();
    for member in split_top_level(annotation, b'|') {
        match member.text {
            "null" | "undefined" => nullable = true,
            m => members.push(m),
        }
    }

    if !members.is_empty() && members.iter().all(|m| string_literal(m).is_some()) {
        let values = members.iter().filter_map(|m| string_literal(m)).collect();
        return (FieldType::Enum(values), false, nullable);
    }

    let single = match members.as_slice() {
        [one] => one.trim(),
        [] => return (FieldType::Unknown, false, nullable),
        _ => return (FieldType::Other(members.join(" | ")), false, nullable),
    };

    let (element, is_array) = if let Some(el) = single.strip_suffix("[]") {
        (el.trim(), true)
    } else if let Some(el) = single
        .strip_prefix("Array<")
        .and_then(|rest| rest.strip_suffix('>'))
    {
        (el.trim(), true)
    } else {
        (single, false)
    };

    let head = element.split('<').next().unwrap_or(element).trim();
    let ty = match TS_TYPES.get(head) {
        Some(base) => base.into_type(Vec::new()),
        None if head.is_empty() => FieldType::Unknown,
        None => FieldType::Other(head.to_string()),
    };
    (ty, is_array, nullable)
}

fn decorated_field(raw: &str) -> Option<FieldRecord> {
    let (decorators, rest) = parse_decorators(raw);
    let caps = PROPERTY_RE.captures(rest.trim())?;
    let name = caps.get(1)?.as_str();
    // Methods and accessors are not fields.
    if rest.contains('(') && caps.get(3).is_none() {
        return None;
    }
    let marker = caps.get(2).map(|m| m.as_str());
    let annotation = caps.get(3).map(|m| m.as_str().trim());
    let initializer = caps.get(4).map(|m| m.as_str().trim());

    let mut field = FieldRecord::new(name, FieldType::Unknown);
    let mut nullable = marker == Some("?");

    let names: Vec<&str> = decorators.iter().map(|d| d.simple_name()).collect();
    let has = |wanted: &str| names.iter().any(|n| *n == wanted);

    // 1. Explicit column / prop type.
    let mut explicit: Option<(FieldType, bool)> = None;
    for d in &decorators {
        let simple = d.simple_name();
        if COLUMN_DECORATORS.contains(&simple) || simple == "PrimaryGeneratedColumn" {
            let column_type = d
                .option("type")
                .and_then(string_literal)
                .or_else(|| d.args.first().and_then(|a| string_literal(a)));
            if let Some(ct) = column_type {
                let values = d.option("enum").map(string_list).unwrap_or_default();
                explicit = Some((lookup(&SQL_COLUMN_TYPES, &ct.to_ascii_lowercase(), values), false));
            } else if let Some(first) = d.args.first().filter(|a| a.contains("DataType")) {
                explicit = Some(relational_type(first));
            } else if let Some(values) = d.option("enum").map(string_list) {
                explicit = Some((FieldType::Enum(values), false));
            }
            if simple == "PrimaryGeneratedColumn" && explicit.is_none() {
                explicit = Some((FieldType::Number, false));
            } else if simple == "PrimaryGeneratedColumn" {
                if let Some((FieldType::Other(t), _)) = &explicit {
                    if t == "uuid" || t == "increment" || t == "identity" {
                        let ty = if t == "uuid" { FieldType::String } else { FieldType::Number };
                        explicit = Some((ty, false));
                    }
                }
            }
        } else if matches!(simple, "CreateDateColumn" | "UpdateDateColumn" | "DeleteDateColumn") {
            explicit = Some((FieldType::Date, false));
        } else if simple == "Prop" {
            if let Some(type_expr) = d.option("type") {
                let typed = document_field(name, type_expr);
                explicit = Some((typed.field_type, typed.is_array));
            } else if let Some(first) = d.args.first().filter(|a| a.starts_with('[')) {
                let typed = document_field(name, first);
                explicit = Some((typed.field_type, typed.is_array));
            }
            if let Some(values) = d.option("enum").map(string_list).filter(|v| !v.is_empty()) {
                explicit = Some((FieldType::Enum(values), false));
            }
        } else if simple == "IsIn" {
            if let Some(values) = d.args.first().map(|a| string_list(a)) {
                explicit = Some((FieldType::Enum(values), false));
            }
        }
    }

    // 2. TS annotation, 3. validator decorators.
    let (ty, is_array) = match explicit {
        Some(found) => found,
        None => {
            let from_annotation = annotation.map(ts_type);
            match from_annotation {
                Some((ty, is_array, union_null)) if ty != FieldType::Unknown => {
                    nullable |= union_null;
                    (ty, is_array)
                }
                _ => decorators
                    .iter()
                    .find_map(|d| VALIDATOR_TYPES.get(d.simple_name()))
                    .map(|base| (base.into_type(Vec::new()), false))
                    .unwrap_or((FieldType::Unknown, false)),
            }
        }
    };
    field.field_type = ty;
    field.is_array = is_array;

    // Required.
    let generated = names.iter().any(|n| GENERATED_DECORATORS.contains(n));
    field.required = if generated || nullable || has("IsOptional") {
        false
    } else if has("Prop") {
        decorators
            .iter()
            .filter(|d| d.simple_name() == "Prop")
            .any(|d| is_true(d.option("required")))
    } else if let Some(col) = decorators
        .iter()
        .find(|d| COLUMN_DECORATORS.contains(&d.simple_name()))
    {
        !is_true(col.option("nullable"))
    } else {
        true
    };

    field.default = decorators
        .iter()
        .find_map(|d| d.option("default"))
        .map(|v| v.trim().to_string())
        .or_else(|| initializer.map(|v| v.to_string()));

    Some(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(dialect: Dialect, raw: &str) -> String {
        normalize_field(dialect, raw).unwrap().describe()
    }

    #[test]
    fn test_document_forms() {
        let d = Dialect::DocumentSchema;
        assert_eq!(norm(d, "name: String"), "String");
        assert_eq!(norm(d, "status: { type: String, required: true }"), "String (required)");
        assert_eq!(
            norm(d, "role: { type: String, enum: ['user', 'admin'], default: 'user' }"),
            "Enum(user|admin) (default: 'user')"
        );
        assert_eq!(
            norm(d, "owner: { type: Schema.Types.ObjectId, ref: 'User', required: [true, 'owner is required'] }"),
            "ObjectId (required)"
        );
        assert_eq!(norm(d, "tags: [String]"), "String[]");
        assert_eq!(norm(d, "items: [{ type: mongoose.Schema.Types.ObjectId, ref: 'Item' }]"), "ObjectId[]");
        assert_eq!(norm(d, "address: { street: String, city: String }"), "JSON");
        assert_eq!(norm(d, "location: Point"), "Point");
    }

    #[test]
    fn test_relational_forms() {
        let d = Dialect::RelationalDefine;
        assert_eq!(norm(d, "email: DataTypes.STRING"), "String");
        assert_eq!(
            norm(d, "email: { type: DataTypes.STRING(255), allowNull: false, unique: true }"),
            "String (required)"
        );
        assert_eq!(
            norm(d, "status: { type: DataTypes.ENUM('pending', 'paid'), defaultValue: 'pending' }"),
            "Enum(pending|paid) (default: 'pending')"
        );
        assert_eq!(norm(d, "tags: Sequelize.ARRAY(Sequelize.TEXT)"), "String[]");
        assert_eq!(norm(d, "id: { type: DataTypes.INTEGER, primaryKey: true, autoIncrement: true }"), "Number (required)");
        assert_eq!(norm(d, "geo: DataTypes.GEOMETRY"), "GEOMETRY");
        assert_eq!(norm(d, "meta: { allowNull: true }"), "Unknown");
    }

    #[test]
    fn test_prisma_forms() {
        let d = Dialect::DeclarativeModel;
        assert_eq!(norm(d, "id Int @id @default(autoincrement())"), "Number (required, default: autoincrement())");
        assert_eq!(norm(d, "bio String? // free text"), "String");
        assert_eq!(norm(d, "posts Post[]"), "Post[]");
        assert_eq!(norm(d, "createdAt DateTime @default(now())"), "Date (required, default: now())");
        assert!(normalize_field(d, "@@index([email])").is_none());
        assert!(normalize_field(d, "// comment only").is_none());
    }

    #[test]
    fn test_decorated_forms() {
        let d = Dialect::DecoratedClass;
        assert_eq!(norm(d, "@Column({ type: 'varchar', nullable: true })\n  email?: string;"), "String");
        assert_eq!(norm(d, "@Column() name: string;"), "String (required)");
        assert_eq!(norm(d, "@Column('int', { default: 0 }) stock: number;"), "Number (required, default: 0)");
        assert_eq!(norm(d, "@PrimaryGeneratedColumn('uuid') id: string;"), "String");
        assert_eq!(norm(d, "@CreateDateColumn() createdAt: Date;"), "Date");
        assert_eq!(
            norm(d, "@Column({ type: 'enum', enum: ['draft', 'live'] }) state: State;"),
            "Enum(draft|live) (required)"
        );
        assert_eq!(norm(d, "@OneToMany(() => Post, (p) => p.author) posts: Post[];"), "Post[]");
        assert_eq!(norm(d, "@Prop({ required: true }) title: string;"), "String (required)");
        assert_eq!(norm(d, "@Prop() subtitle: string;"), "String");
        assert_eq!(norm(d, "@IsEmail() @IsOptional() contact: string;"), "String");
        assert_eq!(norm(d, "@IsInt() quantity;"), "Number (required)");
        assert_eq!(norm(d, "status: 'open' | 'closed' = 'open';"), "Enum(open|closed) (required, default: 'open')");
    }

    #[test]
    fn test_is_detailed() {
        assert!(is_detailed("status: { type: String }"));
        assert!(is_detailed("items: [{ type: String }]"));
        assert!(!is_detailed("status: String"));
    }

    #[test]
    fn test_resolve_enums() {
        let mut schema = ModelSchema::default();
        schema.absorb_detailed(normalize_field(Dialect::DeclarativeModel, "role Role @default(USER)").unwrap());
        let mut enums = BTreeMap::new();
        enums.insert("Role".to_string(), vec!["USER".to_string(), "ADMIN".to_string()]);
        resolve_enums(&mut schema, &enums);
        assert_eq!(schema.field_map()["role"], "Enum(USER|ADMIN) (required, default: USER)");
    }
}
