use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::core::scheduler::types::ExecutionContext;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Substitute every `{name}` the context can resolve. Unknown placeholders
/// are left as written.
pub fn render(template: &str, context: &ExecutionContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            context
                .lookup(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn render_params(
    params: &BTreeMap<String, String>,
    context: &ExecutionContext,
) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), render(value, context)))
        .collect()
}

pub fn has_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}
