//! Constraint message templates.
//!
//! `{row.attr}` renders the settled value of `attr`, `{old_row.attr}` its
//! committed value. Strings render unquoted; absent values render as `null`.
//! Any other braces are left as written.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use rulebank_registry::RowState;

const PLACEHOLDER: &str = r"\{(row|old_row)\.([A-Za-z_][A-Za-z0-9_]*)\}";

fn placeholder() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER).ok()).as_ref()
}

/// Render `template` against a row.
pub fn render(template: &str, state: &RowState<'_>) -> String {
    let Some(re) = placeholder() else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &Captures<'_>| {
        let attr = &caps[2];
        let value = match &caps[1] {
            "row" => state.get(attr),
            _ => state.old(attr),
        };
        value.to_plain_string()
    })
    .into_owned()
}
