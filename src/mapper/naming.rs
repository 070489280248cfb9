use std::collections::BTreeSet;
use tracing::warn;

const KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "else", "enum", "extern", "false", "fn", "for", "if",
    "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static",
    "struct", "trait", "true", "type", "unsafe", "use", "where", "while", "async", "await", "dyn",
    "abstract", "become", "box", "do", "final", "macro", "override", "priv", "typeof", "unsized",
    "virtual", "yield", "try", "gen",
];

// Keywords that cannot be written as raw identifiers.
const NON_RAW_KEYWORDS: &[&str] = &["self", "Self", "crate", "super", "_"];

/// Convert a snake_case (or kebab/dotted) name to CamelCase
///
/// # Example
///
/// ```rust
/// use kubeform::mapper::to_camel_case;
/// assert_eq!(to_camel_case("target_list"), "TargetList");
/// assert_eq!(to_camel_case("alert-v2"), "AlertV2");
/// ```
pub fn to_camel_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Convert a CamelCase or mixed name to snake_case
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out
}

/// Turn a provider attribute name into a legal Rust field identifier.
///
/// The provider name is kept verbatim as the serialization key; only the
/// Rust-side identifier is rewritten.
pub fn sanitize_field_name(name: &str) -> String {
    let mut s = to_snake_case(name);
    let trimmed = s.trim_matches('_');
    if trimmed.is_empty() {
        s = "field".to_string();
    } else if trimmed.len() != s.len() && !s.starts_with('_') {
        s = trimmed.to_string();
    }
    if s.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        s.insert(0, '_');
    }
    if NON_RAW_KEYWORDS.contains(&s.as_str()) {
        return format!("{s}_");
    }
    if KEYWORDS.contains(&s.as_str()) {
        return format!("r#{s}");
    }
    s
}

/// Return `name`, or `nameN` for the first free `N >= 2`, and record it as used.
pub fn unique_name(seen: &mut BTreeSet<String>, name: &str) -> String {
    if seen.insert(name.to_string()) {
        return name.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{name}{counter}");
        if seen.insert(candidate.clone()) {
            warn!(name = %name, candidate = %candidate, "Duplicate generated name disambiguated");
            return candidate;
        }
        counter += 1;
    }
}

/// Derive the CRD kind for a provider resource type.
///
/// The provider prefix is stripped (`wavefront_alert` → `Alert`); a resource
/// named exactly like the provider keeps its full name.
pub fn kind_for_resource(provider: &str, resource: &str) -> String {
    let prefix = format!("{provider}_");
    let base = resource.strip_prefix(&prefix).unwrap_or(resource);
    let camel = to_camel_case(base);
    if camel.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("R{camel}")
    } else {
        camel
    }
}

/// Lower-case plural used in CRD names and resource paths (`Alert` → `alerts`).
pub fn plural_for_kind(kind: &str) -> String {
    let lower = kind.to_ascii_lowercase();
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh")
    {
        format!("{lower}es")
    } else if let Some(stem) = lower.strip_suffix('y') {
        if stem.ends_with(|c: char| "aeiou".contains(c)) {
            format!("{lower}s")
        } else {
            format!("{stem}ies")
        }
    } else {
        format!("{lower}s")
    }
}
