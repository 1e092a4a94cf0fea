//! Business-flow steps: what each service method calls.
//!
//! A step is `Target.method`, where the target is another service, a
//! model reached through its ORM, or a repository.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

use super::canonical::canonicalize;
use super::scanner::line_of;
use super::services::{call_target, member_calls, scope_aliases, ServiceScope};
use super::types::{Entity, EntityAttributes, EntityKind};
use super::SourceUnit;

lazy_static! {
    static ref MODEL_CALL_RE: Regex =
        Regex::new(r"\b([A-Z][A-Za-z0-9_]*)\s*\.\s*([a-z][A-Za-z]*)\s*\(").unwrap();
    static ref PRISMA_CALL_RE: Regex = Regex::new(
        r"\bprisma\s*\.\s*([a-z][\w]*)\s*\.\s*([a-z][A-Za-z]*)\s*\("
    ).unwrap();
    static ref REPOSITORY_CALL_RE: Regex = Regex::new(
        r"\b(?:this\s*\.\s*)?([a-z][\w$]*(?:Repository|Repo))\s*\.\s*([a-z][A-Za-z]*)\s*\("
    ).unwrap();
}

/// Static methods that mark an ORM model receiver.
static ORM_METHODS: phf::Set<&'static str> = phf_set! {
    "find", "findOne", "findById", "findAll", "findByPk", "findAndCountAll",
    "findOneAndUpdate", "findOneAndDelete", "findByIdAndUpdate", "findByIdAndDelete",
    "findMany", "findFirst", "findUnique", "create", "createMany", "insertMany",
    "update", "updateOne", "updateMany", "delete", "deleteOne", "deleteMany",
    "destroy", "save", "count", "countDocuments", "aggregate", "upsert",
    "bulkCreate", "exists", "remove",
};

/// Capitalized globals that share method names with ORMs.
const GLOBALS: &[&str] = &[
    "Object", "Array", "JSON", "Promise", "Math", "Date", "Number", "String", "Reflect", "Buffer",
    "Map", "Set", "Intl", "Symbol", "Error",
];

/// Steps of one method body, sorted and deduplicated.
fn method_steps(body: &str, aliases: &BTreeMap<String, String>) -> BTreeSet<String> {
    let mut steps = BTreeSet::new();

    for (receiver, method) in member_calls(body) {
        if let Some(target) = call_target(receiver, aliases) {
            steps.insert(format!("{}.{}", target, method));
        }
    }

    for caps in MODEL_CALL_RE.captures_iter(body) {
        let (Some(model), Some(method)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let (model, method) = (model.as_str(), method.as_str());
        if !ORM_METHODS.contains(method) || GLOBALS.contains(&model) || aliases.contains_key(model) {
            continue;
        }
        if model.to_ascii_lowercase().ends_with("service") {
            continue;
        }
        if let Some(target) = canonicalize(model, EntityKind::Model) {
            steps.insert(format!("{}.{}", target, method));
        }
    }

    for caps in PRISMA_CALL_RE.captures_iter(body) {
        let (Some(model), Some(method)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(target) = canonicalize(model.as_str(), EntityKind::Model) {
            steps.insert(format!("{}.{}", target, method.as_str()));
        }
    }

    for caps in REPOSITORY_CALL_RE.captures_iter(body) {
        let (Some(repo), Some(method)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(target) = canonicalize(repo.as_str(), EntityKind::FlowStep) {
            steps.insert(format!("{}.{}", target, method.as_str()));
        }
    }
    steps
}

/// Flow map of the declared services: service → method → steps.
pub fn flows(
    unit: &SourceUnit,
    scopes: &[ServiceScope<'_>],
) -> BTreeMap<String, BTreeMap<String, BTreeSet<String>>> {
    let text = unit.masked.as_str();
    let mut out: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
    for scope in scopes {
        let aliases = scope_aliases(text, scope);
        for (method, body) in &scope.methods {
            let steps = method_steps(body.text, &aliases);
            if steps.is_empty() {
                continue;
            }
            out.entry(scope.name.clone())
                .or_default()
                .entry(method.to_string())
                .or_default()
                .extend(steps);
        }
    }
    out
}

/// Flow-step entities, one per `(service, method, step)`.
pub fn detect_flow_steps(unit: &SourceUnit, scopes: &[ServiceScope<'_>]) -> Vec<Entity> {
    let text = unit.masked.as_str();
    let mut entities = Vec::new();
    for scope in scopes {
        let aliases = scope_aliases(text, scope);
        for (method, body) in &scope.methods {
            for step in method_steps(body.text, &aliases) {
                let canonical_name = format!("{}.{} -> {}", scope.name, method, step);
                if entities.iter().any(|e: &Entity| e.canonical_name == canonical_name) {
                    continue;
                }
                entities.push(Entity {
                    kind: EntityKind::FlowStep,
                    canonical_name,
                    source_file: unit.path.clone(),
                    line: line_of(text, body.offset),
                    attributes: EntityAttributes::FlowStep {
                        service: scope.name.clone(),
                        method: method.to_string(),
                        target: step,
                    },
                });
            }
        }
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::services::declared_services;
    use pretty_assertions::assert_eq;

    fn flow_map(path: &str, src: &str) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let unit = SourceUnit::new(path, src);
        let scopes = declared_services(&unit);
        flows(&unit, &scopes)
            .into_iter()
            .map(|(service, methods)| {
                let methods = methods
                    .into_iter()
                    .map(|(m, steps)| (m, steps.into_iter().collect()))
                    .collect();
                (service, methods)
            })
            .collect()
    }

    #[test]
    fn test_class_service_flows() {
        let src = r#"
export class OrderService {
  constructor(
    private readonly payments: PaymentService,
    @InjectRepository(Order) private orderRepository: Repository<Order>,
    private prisma: PrismaClient,
  ) {}

  async checkout(userId: string, cart: Cart) {
    const user = await this.prisma.user.findUnique({ where: { id: userId } });
    const total = Math.round(cart.total);
    await this.payments.charge(user, total);
    const order = await this.orderRepository.save({ userId, total });
    await AuditLog.create({ action: 'checkout' });
    return JSON.stringify(order);
  }

  private helper() {
    return Object.keys({});
  }
}
"#;
        let found = flow_map("src/orders/order.service.ts", src);
        assert_eq!(found.len(), 1);
        assert_eq!(
            found["OrderService"]["checkout"],
            vec![
                "AuditLog.create",
                "OrderRepository.save",
                "PaymentService.charge",
                "User.findUnique",
            ]
        );
        assert!(!found["OrderService"].contains_key("helper"));
    }

    #[test]
    fn test_object_literal_service_flows() {
        let src = r#"
const userService = {
  async register(data) {
    const user = await User.create(data);
    await emailService.sendWelcome(user.email);
    return user;
  },
  remove: async (id) => User.findByIdAndDelete(id),
};
module.exports = userService;
"#;
        let found = flow_map("src/services/user.js", src);
        assert_eq!(
            found["UserService"]["register"],
            vec!["EmailService.sendWelcome", "User.create"]
        );
        assert_eq!(found["UserService"]["remove"], vec!["User.findByIdAndDelete"]);
    }

    #[test]
    fn test_flow_step_entities() {
        let src = "class CartService {\n  add(item) { return Cart.updateOne({ id: item.id }, item); }\n}\n";
        let unit = SourceUnit::new("src/cart.service.ts", src);
        let scopes = declared_services(&unit);
        let steps = detect_flow_steps(&unit, &scopes);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].canonical_name, "CartService.add -> Cart.updateOne");
        assert_eq!(steps[0].line, 2);
    }
}
