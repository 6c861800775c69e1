//! Version-token rewriting for change proposals.

use crate::models::{EditValue, Update};

/// The replacement text an edit rule writes for `update`.
pub fn format_value(update: &Update, value: EditValue) -> String {
    match value {
        EditValue::Full => update.identifier.clone(),
        EditValue::StripV => strip_v(&update.identifier).to_string(),
        EditValue::ShortSha => strip_v(&update.marker).chars().take(7).collect(),
    }
}

fn strip_v(s: &str) -> &str {
    s.strip_prefix('v').unwrap_or(s)
}

/// Replace the token that follows every occurrence of `prefix`.
///
/// A token ends at whitespace or a quote. Returns `None` when the prefix is
/// absent or the content would not change.
pub fn replace_after_prefix(content: &str, prefix: &str, value: &str) -> Option<String> {
    if prefix.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(content.len() + value.len());
    let mut rest = content;

    while let Some(pos) = rest.find(prefix) {
        let token_start = pos + prefix.len();
        out.push_str(&rest[..token_start]);

        let after = &rest[token_start..];
        let token_len = after
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(after.len());
        out.push_str(value);
        rest = &after[token_len..];
    }
    out.push_str(rest);

    (out != content).then_some(out)
}
