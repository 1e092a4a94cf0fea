//! Prioritized rule tables for auth policies and service categories.
//!
//! Both classifiers walk an ordered table and stop at the first rule that
//! matches, so adding a rule never requires touching the evaluation code.

use once_cell::sync::Lazy;

use super::scanner::{call_args, string_list, string_literal};
use super::types::{AuthPolicy, ServiceCategory};

/// A middleware / guard expression reduced to its callee and the first
/// literal argument (`requireRole('admin')` -> `requireRole`, `admin`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiddlewareExpr {
    pub callee: String,
    pub literal_arg: Option<String>,
}

impl MiddlewareExpr {
    /// Parse an argument expression. Inline functions and object literals
    /// are not middleware references and yield `None`.
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        let expr = expr.strip_prefix("new ").unwrap_or(expr).trim_start();
        let end = expr
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.'))
            .unwrap_or(expr.len());
        let callee = expr[..end].trim_matches('.');
        if callee.is_empty()
            || callee.starts_with(|c: char| c.is_ascii_digit())
            || matches!(callee, "async" | "function")
        {
            return None;
        }

        let rest = expr[end..].trim_start();
        if rest.starts_with("=>") {
            return None;
        }
        let literal_arg = match rest.find('(') {
            Some(0) => {
                let open = expr.len() - rest.len();
                call_args(expr, open).and_then(|(args, _)| {
                    args.first().and_then(|first| {
                        string_literal(first.text)
                            .or_else(|| string_list(first.text).into_iter().next())
                    })
                })
            }
            _ => None,
        };

        Some(Self {
            callee: callee.to_string(),
            literal_arg,
        })
    }

    /// Lower-cased match keys: last callee segment and the whole callee
    /// with dots removed (`auth.required` -> `authrequired`).
    fn keys(&self) -> [String; 2] {
        let lower = self.callee.to_ascii_lowercase();
        let last = lower.rsplit('.').next().unwrap_or(&lower).to_string();
        [last, lower.replace('.', "")]
    }
}

enum NameMatch {
    Exact(&'static [&'static str]),
    Contains(&'static [&'static str]),
}

impl NameMatch {
    fn matches(&self, keys: &[String; 2]) -> bool {
        match self {
            NameMatch::Exact(names) => keys.iter().any(|k| names.contains(&k.as_str())),
            NameMatch::Contains(parts) => parts.iter().any(|p| keys[1].contains(*p)),
        }
    }
}

struct AuthRule {
    names: NameMatch,
    /// Literal argument required for the rule to fire, if any.
    literal: LiteralNeed,
    build: fn(Option<&str>) -> AuthPolicy,
}

enum LiteralNeed {
    Ignored,
    Any,
    OneOf(&'static [&'static str]),
}

fn role_policy(literal: Option<&str>) -> AuthPolicy {
    match literal {
        Some(role) if role.eq_ignore_ascii_case("admin") => AuthPolicy::AdminOnly,
        Some(role) => AuthPolicy::Role(role.to_string()),
        None => AuthPolicy::Custom,
    }
}

fn permission_policy(literal: Option<&str>) -> AuthPolicy {
    AuthPolicy::Permission(literal.unwrap_or_default().to_string())
}

static AUTH_RULES: Lazy<Vec<AuthRule>> = Lazy::new(|| {
    vec![
        AuthRule {
            names: NameMatch::Exact(&[
                "isadmin",
                "requireadmin",
                "adminonly",
                "onlyadmin",
                "adminauth",
                "verifyadmin",
                "ensureadmin",
                "checkadmin",
                "adminguard",
                "adminmiddleware",
            ]),
            literal: LiteralNeed::Ignored,
            build: |_| AuthPolicy::AdminOnly,
        },
        AuthRule {
            names: NameMatch::Exact(&[
                "requirerole",
                "requireroles",
                "authorize",
                "hasrole",
                "hasroles",
                "checkrole",
                "checkroles",
                "roles",
                "restrictto",
                "allowroles",
            ]),
            literal: LiteralNeed::Any,
            build: role_policy,
        },
        AuthRule {
            names: NameMatch::Exact(&[
                "requirepermission",
                "requirepermissions",
                "checkpermission",
                "checkpermissions",
                "haspermission",
                "permissions",
                "can",
                "permit",
            ]),
            literal: LiteralNeed::Any,
            build: permission_policy,
        },
        AuthRule {
            names: NameMatch::Exact(&["authenticate", "authguard", "passportauthenticate"]),
            literal: LiteralNeed::OneOf(&["jwt"]),
            build: |_| AuthPolicy::JwtRequired,
        },
        AuthRule {
            names: NameMatch::Exact(&[
                "verifytoken",
                "verifyjwt",
                "verifyaccesstoken",
                "jwtauth",
                "jwtauthguard",
                "jwtguard",
                "expressjwt",
                "jwt",
                "checkjwt",
                "requirejwt",
                "validatejwt",
                "authenticatejwt",
                "jwtmiddleware",
            ]),
            literal: LiteralNeed::Ignored,
            build: |_| AuthPolicy::JwtRequired,
        },
        AuthRule {
            names: NameMatch::Exact(&[
                "apikey",
                "verifyapikey",
                "requireapikey",
                "checkapikey",
                "validateapikey",
                "apikeyauth",
                "apikeyguard",
            ]),
            literal: LiteralNeed::Ignored,
            build: |_| AuthPolicy::ApiKey,
        },
        AuthRule {
            names: NameMatch::Exact(&[
                "authenticate",
                "authenticated",
                "requireauth",
                "isauthenticated",
                "ensureauthenticated",
                "ensureloggedin",
                "isloggedin",
                "protect",
                "auth",
                "authrequired",
                "authmiddleware",
                "withauth",
                "checkauth",
                "loginrequired",
                "requirelogin",
                "requireuser",
                "requiresignin",
                "verifysession",
                "requiresession",
                "authguard",
                "passportauthenticate",
            ]),
            literal: LiteralNeed::Ignored,
            build: |_| AuthPolicy::Authenticated,
        },
        AuthRule {
            names: NameMatch::Contains(&["guard", "auth", "permission", "policy"]),
            literal: LiteralNeed::Ignored,
            build: |_| AuthPolicy::Custom,
        },
    ]
});

/// Classify a middleware expression. `None` when it carries no auth
/// meaning (validators, loggers, handlers).
pub fn classify_auth(expr: &MiddlewareExpr) -> Option<AuthPolicy> {
    let keys = expr.keys();
    // Handler references are never policies, whatever their name says.
    if keys[1].contains("controller") || keys[1].contains("handler") {
        return None;
    }
    let literal = expr.literal_arg.as_deref();
    AUTH_RULES
        .iter()
        .find(|rule| {
            rule.names.matches(&keys)
                && match rule.literal {
                    LiteralNeed::Ignored => true,
                    LiteralNeed::Any => literal.is_some(),
                    LiteralNeed::OneOf(values) => literal
                        .map(|l| values.iter().any(|v| l.eq_ignore_ascii_case(v)))
                        .unwrap_or(false),
                }
        })
        .map(|rule| (rule.build)(literal))
}

// ---------------------------------------------------------------------------
// Service categories

enum CategorySignal {
    /// Words of the canonical name (suffix removed).
    NameWord(&'static [&'static str]),
    /// Directory segments of the source path.
    Directory(&'static [&'static str]),
}

struct CategoryRule {
    signal: CategorySignal,
    category: ServiceCategory,
}

static CATEGORY_RULES: Lazy<Vec<CategoryRule>> = Lazy::new(|| {
    vec![
        CategoryRule {
            signal: CategorySignal::NameWord(&[
                "email",
                "mail",
                "mailer",
                "sms",
                "notification",
                "notifier",
                "push",
                "log",
                "logger",
                "logging",
                "cache",
                "redis",
                "queue",
                "storage",
                "upload",
                "file",
                "s3",
                "crypto",
                "hash",
                "hashing",
                "encryption",
                "token",
                "jwt",
                "config",
                "util",
                "utils",
                "helper",
                "http",
                "pdf",
                "image",
                "validator",
                "validation",
                "scheduler",
                "cron",
                "metrics",
                "analytics",
                "monitor",
                "monitoring",
                "health",
                "audit",
                "search",
                "i18n",
                "translation",
                "socket",
                "websocket",
            ]),
            category: ServiceCategory::Utility,
        },
        CategoryRule {
            signal: CategorySignal::Directory(&[
                "utils",
                "util",
                "helpers",
                "helper",
                "lib",
                "libs",
                "common",
                "shared",
                "infrastructure",
                "infra",
                "adapters",
                "integrations",
                "middleware",
                "middlewares",
                "tools",
            ]),
            category: ServiceCategory::Utility,
        },
        CategoryRule {
            signal: CategorySignal::NameWord(&[
                "payment",
                "order",
                "user",
                "account",
                "customer",
                "product",
                "cart",
                "checkout",
                "invoice",
                "billing",
                "subscription",
                "inventory",
                "shipping",
                "booking",
                "reservation",
                "catalog",
                "pricing",
                "transaction",
                "wallet",
                "auth",
                "profile",
            ]),
            category: ServiceCategory::Business,
        },
        CategoryRule {
            signal: CategorySignal::Directory(&[
                "domain", "domains", "modules", "features", "business", "services",
            ]),
            category: ServiceCategory::Business,
        },
    ]
});

/// Lower-cased PascalCase / camelCase words of an identifier.
fn name_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Exact word, plural, or (for keywords of four chars or more) prefix.
fn word_matches(word: &str, keyword: &str) -> bool {
    word == keyword
        || word.strip_suffix('s') == Some(keyword)
        || (keyword.len() >= 4 && word.starts_with(keyword))
}

fn directory_segments(path: &str) -> Vec<String> {
    let mut parts: Vec<String> = path
        .split(['/', '\\'])
        .filter(|p| !p.is_empty())
        .map(|p| p.to_ascii_lowercase())
        .collect();
    // The file name is not a directory.
    parts.pop();
    parts
}

/// Category of a canonical service name declared in `path`.
pub fn classify_service(name: &str, path: &str, default: ServiceCategory) -> ServiceCategory {
    let base = name.strip_suffix("Service").unwrap_or(name);
    let words = name_words(base);
    let dirs = directory_segments(path);

    CATEGORY_RULES
        .iter()
        .find(|rule| match rule.signal {
            CategorySignal::NameWord(keywords) => words
                .iter()
                .any(|w| keywords.iter().any(|k| word_matches(w, k))),
            CategorySignal::Directory(names) => {
                dirs.iter().any(|d| names.contains(&d.as_str()))
            }
        })
        .map(|rule| rule.category)
        .unwrap_or(default)
}
