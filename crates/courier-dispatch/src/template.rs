//! Placeholder substitution for message bodies.
//!
//! Two interchangeable syntaxes reference the same variable namespace:
//! `${name}` and `{{name}}`. Unresolved placeholders render as the empty
//! string, never as an error. Pure and safe to call from any worker.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn dollar_syntax() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{(\w+)\}").expect("static pattern"))
}

fn braces_syntax() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("static pattern"))
}

/// Substitute every placeholder in `template` from `variables`.
pub fn render(template: &str, variables: &BTreeMap<String, String>) -> String {
    let substitute = |caps: &Captures| -> String {
        variables.get(&caps[1]).cloned().unwrap_or_default()
    };
    let pass = dollar_syntax().replace_all(template, substitute);
    braces_syntax().replace_all(&pass, substitute).into_owned()
}

/// Whether `s` contains a placeholder in either syntax. Used to decide if a
/// literal message is pre-rendered text or still needs substitution.
pub fn has_placeholder(s: &str) -> bool {
    dollar_syntax().is_match(s) || braces_syntax().is_match(s)
}
