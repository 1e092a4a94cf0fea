//! Database model detectors.
//!
//! Each detector yields `(raw name, offset, schema)` triples, which are
//! folded in source order. Within one declaration detailed entries are
//! absorbed before simple ones; two declarations of the same canonical name
//! in one file overlay, the later one winning per field.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::canonical::canonicalize;
use super::dialect::{is_detailed, normalize_field, resolve_enums, Dialect};
use super::scanner::{
    call_args, class_members, classes, inner, line_of, matching_close, split_key_value,
    split_top_level, strip_braces, MemberKind,
};
use super::types::{Entity, EntityAttributes, EntityKind, ModelSchema};
use super::SourceUnit;

lazy_static! {
    static ref PRISMA_MODEL_RE: Regex = Regex::new(r"(?m)^\s*(model|type|view)\s+([A-Za-z_]\w*)\s*\{").unwrap();
    static ref PRISMA_ENUM_RE: Regex = Regex::new(r"(?m)^\s*enum\s+([A-Za-z_]\w*)\s*\{").unwrap();
    static ref SCHEMA_BINDING_RE: Regex = Regex::new(
        r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)(?:\s*:[^=]+)?\s*=\s*new\s+(?:mongoose\s*\.\s*)?Schema\s*(?:<[^>]*>)?\s*\("
    ).unwrap();
    static ref MODEL_CALL_RE: Regex = Regex::new(
        r#"\bmodel\s*(?:<[^>]*>)?\s*\(\s*['"]([A-Za-z_$][\w$]*)['"]\s*,\s*([A-Za-z_$][\w$]*)\s*[,)]"#
    ).unwrap();
    static ref INLINE_MODEL_RE: Regex = Regex::new(
        r#"\bmodel\s*(?:<[^>]*>)?\s*\(\s*['"]([A-Za-z_$][\w$]*)['"]\s*,\s*new\s+(?:mongoose\s*\.\s*)?Schema\s*(?:<[^>]*>)?\s*\("#
    ).unwrap();
    static ref DEFINE_RE: Regex = Regex::new(
        r#"\.\s*define\s*(?:<[^>]*>)?\s*\(\s*['"]([A-Za-z_$][\w$]*)['"]\s*,"#
    ).unwrap();
    static ref INIT_RE: Regex = Regex::new(r"\b([A-Z][\w$]*)\s*\.\s*init\s*\(").unwrap();
}

/// Class decorators that mark a persisted model.
const MODEL_DECORATORS: &[&str] = &["Entity", "Table", "Schema", "Model"];

/// Directory names whose plain classes are taken as models.
const MODEL_DIRS: &[&str] = &["models", "model", "entities", "entity"];

/// A detector match before canonicalization.
struct RawModel {
    name: String,
    offset: usize,
    schema: ModelSchema,
}

/// Schema of an object literal body: detailed entries first, then simple
/// ones, so a one-line form never clobbers a detailed one.
fn object_schema(body: &str, dialect: Dialect) -> ModelSchema {
    let entries = split_top_level(body, b',');
    let mut schema = ModelSchema::default();
    for entry in entries.iter().filter(|e| is_detailed(e.text)) {
        if let Some(field) = normalize_field(dialect, entry.text) {
            schema.absorb_detailed(field);
        }
    }
    for entry in entries.iter().filter(|e| !is_detailed(e.text)) {
        if let Some(field) = normalize_field(dialect, entry.text) {
            schema.absorb_simple(field);
        }
    }
    schema
}

/// Schema of the object literal passed as argument `idx` of the call
/// whose `(` is at `open`.
fn object_arg_schema(text: &str, open: usize, idx: usize, dialect: Dialect) -> Option<ModelSchema> {
    let (args, _) = call_args(text, open)?;
    let arg = args.get(idx)?;
    let body = arg.text.strip_prefix('{')?.strip_suffix('}')?;
    Some(object_schema(body, dialect))
}

fn prisma_blocks(text: &str, out: &mut Vec<RawModel>) {
    let mut enums: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for caps in PRISMA_ENUM_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = matching_close(text, open) else {
            continue;
        };
        let values = inner(text, open, close)
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .filter(|tok| !tok.starts_with("@@") && !tok.starts_with("//"))
            .map(str::to_string)
            .collect();
        enums.insert(name.as_str().to_string(), values);
    }

    for caps in PRISMA_MODEL_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some(close) = matching_close(text, open) else {
            continue;
        };
        let mut schema = ModelSchema::default();
        for line in inner(text, open, close).lines() {
            if line.trim_start().starts_with("@@") {
                continue;
            }
            if let Some(field) = normalize_field(Dialect::DeclarativeModel, line) {
                schema.absorb_detailed(field);
            }
        }
        resolve_enums(&mut schema, &enums);
        out.push(RawModel {
            name: name.as_str().to_string(),
            offset: whole.start(),
            schema,
        });
    }
}

fn document_schemas(text: &str, out: &mut Vec<RawModel>) {
    let registered: BTreeMap<&str, &str> = MODEL_CALL_RE
        .captures_iter(text)
        .filter_map(|caps| Some((caps.get(2)?.as_str(), caps.get(1)?.as_str())))
        .collect();

    for caps in SCHEMA_BINDING_RE.captures_iter(text) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(schema) = object_arg_schema(text, whole.end() - 1, 0, Dialect::DocumentSchema) else {
            continue;
        };
        let name = registered.get(var.as_str()).copied().unwrap_or(var.as_str());
        out.push(RawModel {
            name: name.to_string(),
            offset: whole.start(),
            schema,
        });
    }

    for caps in INLINE_MODEL_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(schema) = object_arg_schema(text, whole.end() - 1, 0, Dialect::DocumentSchema) {
            out.push(RawModel {
                name: name.as_str().to_string(),
                offset: whole.start(),
                schema,
            });
        }
    }
}

/// Whether the options object of an `init` call carries Sequelize keys.
fn sequelize_options(arg: &str) -> bool {
    let Some(body) = strip_braces(arg) else {
        return false;
    };
    split_top_level(body, b',').iter().any(|entry| {
        let key = split_key_value(entry.text)
            .map(|(k, _)| k)
            .unwrap_or_else(|| entry.text.trim().to_string());
        key == "sequelize" || key == "modelName"
    })
}

fn relational_defines(text: &str, out: &mut Vec<RawModel>) {
    for caps in DEFINE_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Some(open) = text[..whole.end()].rfind('(') else {
            continue;
        };
        if let Some(schema) = object_arg_schema(text, open, 1, Dialect::RelationalDefine) {
            out.push(RawModel {
                name: name.as_str().to_string(),
                offset: whole.start(),
                schema,
            });
        }
    }

    // `X.init(..)` is only a model when X extends Model or the options
    // name the connection.
    let model_classes: Vec<&str> = classes(text)
        .into_iter()
        .filter(|c| c.extends.and_then(|e| e.rsplit('.').next()) == Some("Model"))
        .map(|c| c.name)
        .collect();
    for caps in INIT_RE.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let open = whole.end() - 1;
        let Some((args, _)) = call_args(text, open) else {
            continue;
        };
        let is_model = model_classes.contains(&name.as_str())
            || args.get(1).is_some_and(|opts| sequelize_options(opts.text));
        if !is_model {
            continue;
        }
        if let Some(schema) = object_arg_schema(text, open, 0, Dialect::RelationalDefine) {
            out.push(RawModel {
                name: name.as_str().to_string(),
                offset: whole.start(),
                schema,
            });
        }
    }
}

fn class_schema(text: &str, body: Option<(usize, usize)>) -> ModelSchema {
    let mut schema = ModelSchema::default();
    let Some((open, close)) = body else {
        return schema;
    };
    for member in class_members(text, open, close) {
        if member.kind != MemberKind::Property || member.body.is_some() {
            continue;
        }
        if let Some(field) = normalize_field(Dialect::DecoratedClass, member.text) {
            schema.absorb_detailed(field);
        }
    }
    schema
}

fn decorated_classes(text: &str, out: &mut Vec<RawModel>) {
    for class in classes(text) {
        if !MODEL_DECORATORS.iter().any(|d| class.decorator(d).is_some()) {
            continue;
        }
        out.push(RawModel {
            name: class.name.to_string(),
            offset: class.offset,
            schema: class_schema(text, class.body),
        });
    }
}

fn in_model_dir(path: &str) -> bool {
    let mut dirs: Vec<&str> = path.split(['/', '\\']).collect();
    dirs.pop();
    dirs.iter().any(|d| MODEL_DIRS.contains(&d.to_ascii_lowercase().as_str()))
}

fn bare_classes(unit: &SourceUnit, out: &mut Vec<RawModel>) {
    if !in_model_dir(&unit.path) {
        return;
    }
    let text = unit.masked.as_str();
    for class in classes(text) {
        out.push(RawModel {
            name: class.name.to_string(),
            offset: class.offset,
            schema: class_schema(text, class.body),
        });
    }
}

/// Model entities of one file, deduplicated by canonical name.
pub fn detect_models(unit: &SourceUnit) -> Vec<Entity> {
    let text = unit.masked.as_str();
    let mut raw = Vec::new();
    if unit.is_prisma() {
        prisma_blocks(text, &mut raw);
    } else {
        document_schemas(text, &mut raw);
        relational_defines(text, &mut raw);
        decorated_classes(text, &mut raw);
        if raw.is_empty() {
            bare_classes(unit, &mut raw);
        }
    }
    raw.sort_by_key(|m| m.offset);

    let mut entities: Vec<Entity> = Vec::new();
    for model in raw {
        let Some(name) = canonicalize(&model.name, EntityKind::Model) else {
            continue;
        };
        let existing = entities.iter_mut().find(|e| e.canonical_name == name);
        match existing {
            Some(Entity {
                attributes: EntityAttributes::Model { schema },
                ..
            }) => schema.overlay(model.schema),
            _ => entities.push(Entity {
                kind: EntityKind::Model,
                canonical_name: name,
                source_file: unit.path.clone(),
                line: line_of(text, model.offset),
                attributes: EntityAttributes::Model {
                    schema: model.schema,
                },
            }),
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn models(path: &str, src: &str) -> Vec<(String, Vec<(String, String)>)> {
        let unit = SourceUnit::new(path, src);
        detect_models(&unit)
            .into_iter()
            .map(|e| match e.attributes {
                EntityAttributes::Model { schema } => {
                    (e.canonical_name, schema.field_map().into_iter().collect())
                }
                _ => unreachable!(),
            })
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_mongoose_named_by_model_call() {
        let src = r#"
const orderSchema = new mongoose.Schema({
  status: { type: String, enum: ['open', 'paid'], required: true },
  items: [{ type: Schema.Types.ObjectId, ref: 'Item' }],
  note: String,
  meta: { tags: { type: [String] }, nested: { deep: { type: Number } } },
  total: Number,
}, { timestamps: true });

module.exports = mongoose.model('Order', orderSchema);
"#;
        let found = models("src/models/order.js", src);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "Order");
        let fields: BTreeMap<_, _> = found[0].1.iter().cloned().collect();
        assert_eq!(fields["status"], "Enum(open|paid) (required)");
        assert_eq!(fields["items"], "ObjectId[]");
        assert_eq!(fields["note"], "String");
        assert!(fields.contains_key("meta"));
        assert_eq!(fields["total"], "Number");
    }

    #[test]
    fn test_mongoose_falls_back_to_variable_name() {
        let src = "const productSchema = new Schema({ sku: { type: String, required: true } });";
        let found = models("src/db.js", src);
        assert_eq!(found[0].0, "Product");
    }

    #[test]
    fn test_sequelize_define_and_init() {
        let src = r#"
const Invoice = sequelize.define('Invoice', {
  amount: { type: DataTypes.DECIMAL(10, 2), allowNull: false },
  paid: DataTypes.BOOLEAN,
});

class Customer extends Model {}
Customer.init({
  email: { type: DataTypes.STRING, allowNull: false, unique: true },
}, { sequelize });
"#;
        let found = models("src/models/index.js", src);
        assert_eq!(
            found,
            vec![
                ("Invoice".to_string(), pairs(&[("amount", "Number (required)"), ("paid", "Boolean")])),
                ("Customer".to_string(), pairs(&[("email", "String (required)")])),
            ]
        );
    }

    #[test]
    fn test_prisma_models_and_enums() {
        let src = r#"
enum Role {
  USER
  ADMIN
}

model User {
  id        Int      @id @default(autoincrement())
  email     String   @unique
  role      Role     @default(USER)
  posts     Post[]
  // audit columns
  createdAt DateTime @default(now())

  @@map("users")
}
"#;
        let found = models("prisma/schema.prisma", src);
        assert_eq!(found[0].0, "User");
        let fields: BTreeMap<_, _> = found[0].1.iter().cloned().collect();
        assert_eq!(fields["role"], "Enum(USER|ADMIN) (required, default: USER)");
        assert_eq!(fields["email"], "String (required)");
        assert_eq!(fields["posts"], "Post[]");
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_decorated_entity() {
        let src = r#"
@Entity('products')
export class ProductEntity {
  @PrimaryGeneratedColumn()
  id: number;

  @Column({ nullable: true })
  description?: string;

  @Column('int', { default: 0 })
  stock: number;

  get label() { return this.description; }
}
"#;
        let found = models("src/catalog/product.entity.ts", src);
        assert_eq!(found[0].0, "Product");
        let fields: BTreeMap<_, _> = found[0].1.iter().cloned().collect();
        assert_eq!(fields["stock"], "Number (required, default: 0)");
        assert_eq!(fields["description"], "String");
        assert!(!fields.contains_key("label"));
    }

    #[test]
    fn test_bare_class_only_in_model_dirs_and_only_as_fallback() {
        let src = "export class Coupon {\n  code: string;\n  percent?: number;\n}\n";
        assert_eq!(models("src/models/coupon.ts", src)[0].0, "Coupon");
        assert!(models("src/utils/coupon.ts", src).is_empty());

        let mixed = format!("{}\nconst tagSchema = new Schema({{ label: String }});\n", src);
        let names: Vec<String> = models("src/models/mixed.ts", &mixed).into_iter().map(|m| m.0).collect();
        assert_eq!(names, vec!["Tag"]);
    }

    #[test]
    fn test_same_name_overlays_later_declaration() {
        let src = r#"
const userSchema = new Schema({ name: { type: String, required: true }, age: Number });
const User = sequelize.define('User', { name: DataTypes.STRING });
"#;
        let found = models("src/models/user.js", src);
        assert_eq!(found.len(), 1);
        let fields: BTreeMap<_, _> = found[0].1.iter().cloned().collect();
        assert_eq!(fields["name"], "String");
        assert_eq!(fields["age"], "Number");
    }

    #[test]
    fn test_later_declaration_wins_in_source_order() {
        let src = r#"
const Order = mongoose.model('Order', new Schema({ status: String, note: String }));
const orderSchema = new Schema({ status: Number });
mongoose.model('Order', orderSchema);
"#;
        let unit = SourceUnit::new("src/models/order.js", src);
        let found = detect_models(&unit);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(
            models("src/models/order.js", src),
            vec![(
                "Order".to_string(),
                pairs(&[("note", "String"), ("status", "Number")])
            )]
        );
    }

    #[test]
    fn test_entities_follow_source_order() {
        let src = r#"
const Invoice = sequelize.define('Invoice', { paid: DataTypes.BOOLEAN });
const tagSchema = new Schema({ label: String });
"#;
        let names: Vec<String> = models("src/db.js", src).into_iter().map(|m| m.0).collect();
        assert_eq!(names, vec!["Invoice", "Tag"]);
    }

    #[test]
    fn test_init_requires_sequelize_shape() {
        let sentry = r#"
Sentry.init({ dsn: process.env.SENTRY_DSN, tracesSampleRate: 1.0 });
Analytics.init({ key: 'abc' }, { debug: true });
"#;
        assert!(models("src/app.js", sentry).is_empty());

        let with_options = "Account.init({ plan: DataTypes.STRING }, { sequelize: db, modelName: 'Account' });";
        assert_eq!(
            models("src/db.js", with_options),
            vec![("Account".to_string(), pairs(&[("plan", "String")]))]
        );
    }
}
