//! Name canonicalization.
//!
//! Every detector routes raw names through [`canonicalize`] before emitting
//! a fact, so `paymentService`, `PaymentService`, `payment.service` and
//! `PaymentSvc` all land on the same `PaymentService`.

use std::path::Path;

use super::types::EntityKind;

/// Names shorter than this after trimming are almost always generic
/// identifiers (`id`, `ok`, `db`).
const MIN_NAME_LEN: usize = 3;

/// Suffix policy for one role.
struct RoleSuffix {
    canonical: &'static str,
    aliases: &'static [&'static str],
}

const SERVICE_SUFFIX: RoleSuffix = RoleSuffix {
    canonical: "Service",
    aliases: &["Svc", "Srv"],
};

const CONTROLLER_SUFFIX: RoleSuffix = RoleSuffix {
    canonical: "Controller",
    aliases: &["Ctrl", "Ctl"],
};

/// Trailing words stripped from model names.
const MODEL_NOISE: &[&str] = &["Model", "Schema", "Entity"];

fn role_suffix(kind: EntityKind) -> Option<&'static RoleSuffix> {
    match kind {
        EntityKind::Service => Some(&SERVICE_SUFFIX),
        EntityKind::Controller => Some(&CONTROLLER_SUFFIX),
        _ => None,
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Canonical identifier for `raw` under the given role, or `None` when the
/// fragment is too short to be a real name.
///
/// Idempotent: `canonicalize(canonicalize(x, k)?, k) == canonicalize(x, k)`.
pub fn canonicalize(raw: &str, kind: EntityKind) -> Option<String> {
    let joined = join_words(raw);
    if joined.len() < MIN_NAME_LEN || joined.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let mut name = capitalize(&joined);

    if let Some(suffix) = role_suffix(kind) {
        name = apply_suffix(&name, suffix);
    } else if kind == EntityKind::Model {
        name = strip_model_noise(name);
    }

    Some(name)
}

/// Canonical name derived from a file name (`payment.service.ts`,
/// `order-controller.js`).
pub fn file_stem_name(path: &str, kind: EntityKind) -> Option<String> {
    let file_name = Path::new(path).file_name()?.to_str()?;
    // Drop only the final extension; inner dots separate words.
    let stem = match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    };
    canonicalize(stem, kind)
}

/// Trim non-identifier chars from both ends and join inner words
/// PascalCase. Leading `_`/`$` markers are dropped.
fn join_words(raw: &str) -> String {
    let trimmed = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    let mut out = String::with_capacity(trimmed.len());
    for (idx, word) in trimmed
        .split(|c: char| !is_ident_char(c))
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        if idx == 0 {
            out.push_str(word);
        } else {
            out.push_str(&capitalize(word));
        }
    }
    // Words may have exposed new edge markers (`a-_b`); trim again.
    out.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

fn apply_suffix(name: &str, suffix: &RoleSuffix) -> String {
    if ends_with_ignore_case(name, suffix.canonical) {
        let base = &name[..name.len() - suffix.canonical.len()];
        return format!("{}{}", base, suffix.canonical);
    }
    for alias in suffix.aliases {
        if ends_with_ignore_case(name, alias) {
            let base = &name[..name.len() - alias.len()];
            return format!("{}{}", base, suffix.canonical);
        }
    }
    format!("{}{}", name, suffix.canonical)
}

fn strip_model_noise(mut name: String) -> String {
    loop {
        let mut stripped = false;
        for noise in MODEL_NOISE {
            if name.len() >= noise.len() + MIN_NAME_LEN && name.ends_with(noise) {
                name.truncate(name.len() - noise.len());
                stripped = true;
            }
        }
        if !stripped {
            return name;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_service_variants_collapse() {
        for raw in [
            "paymentService",
            "PaymentService",
            "PaymentSvc",
            "payment.service",
            "payment-service",
            "Paymentservice",
            "payment",
            "_paymentService",
        ] {
            assert_eq!(
                canonicalize(raw, EntityKind::Service).as_deref(),
                Some("PaymentService"),
                "raw = {}",
                raw
            );
        }
    }

    #[test]
    fn test_controller_suffix() {
        assert_eq!(
            canonicalize("ordersCtrl", EntityKind::Controller).as_deref(),
            Some("OrdersController")
        );
        assert_eq!(
            canonicalize("orders", EntityKind::Controller).as_deref(),
            Some("OrdersController")
        );
    }

    #[test]
    fn test_model_noise_stripped() {
        assert_eq!(canonicalize("userSchema", EntityKind::Model).as_deref(), Some("User"));
        assert_eq!(canonicalize("UserModel", EntityKind::Model).as_deref(), Some("User"));
        assert_eq!(canonicalize("Model", EntityKind::Model).as_deref(), Some("Model"));
        assert_eq!(canonicalize("AbModel", EntityKind::Model).as_deref(), Some("AbModel"));
    }

    #[test]
    fn test_short_names_rejected() {
        assert!(canonicalize("id", EntityKind::Service).is_none());
        assert!(canonicalize("  ok ", EntityKind::Model).is_none());
        assert!(canonicalize("$a", EntityKind::Route).is_none());
        assert!(canonicalize("3dModel", EntityKind::Model).is_none());
    }

    #[test]
    fn test_file_stem_name() {
        assert_eq!(
            file_stem_name("src/services/payment.service.ts", EntityKind::Service).as_deref(),
            Some("PaymentService")
        );
        assert_eq!(
            file_stem_name("src/services/email-sender.js", EntityKind::Service).as_deref(),
            Some("EmailSenderService")
        );
    }

    fn kinds() -> impl Strategy<Value = EntityKind> {
        prop_oneof![
            Just(EntityKind::Service),
            Just(EntityKind::Controller),
            Just(EntityKind::Model),
            Just(EntityKind::Route),
            Just(EntityKind::FlowStep),
        ]
    }

    proptest! {
        #[test]
        fn prop_canonicalize_is_idempotent(raw in "[ -~]{0,24}", kind in kinds()) {
            if let Some(once) = canonicalize(&raw, kind) {
                let twice = canonicalize(&once, kind);
                prop_assert_eq!(twice.as_deref(), Some(once.as_str()));
            }
        }
    }
}
