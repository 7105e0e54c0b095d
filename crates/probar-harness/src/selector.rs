//! CSS selector list handling.
//!
//! Selector lists are split on their top-level commas only. Commas inside
//! quoted strings, attribute brackets or parentheses belong to the compound
//! selector they appear in:
//!
//! ```text
//! [data-x="a,b"], :is(.c, .d), .e   →   [data-x="a,b"] | :is(.c, .d) | .e
//! ```

/// Split a selector list into its trimmed, non-empty compound selectors.
#[must_use]
pub fn split_selector_list(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut brackets = 0usize;
    let mut parens = 0usize;

    for (index, ch) in selector.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' | '\'' => match quote {
                None => quote = Some(ch),
                Some(open) if open == ch => quote = None,
                Some(_) => {}
            },
            _ if quote.is_some() => {}
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            '(' => parens += 1,
            ')' => parens = parens.saturating_sub(1),
            ',' if brackets == 0 && parens == 0 => {
                parts.push(selector[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(selector[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Scope every compound selector of `own` under every compound selector of
/// `ancestor` with a descendant combinator.
///
/// The result is the full cartesian product, ancestor-major, so that each
/// alternative keeps its descendant relationship:
/// `.a, .b` + `.x, .y` gives `.a .x, .a .y, .b .x, .b .y`.
#[must_use]
pub fn scope_under_ancestor(ancestor: &str, own: &str) -> String {
    let ancestors = split_selector_list(ancestor);
    let own_parts = split_selector_list(own);
    if own_parts.is_empty() {
        return ancestors.join(", ");
    }

    let mut scoped = Vec::with_capacity(ancestors.len() * own_parts.len());
    for ancestor in &ancestors {
        for part in &own_parts {
            scoped.push(format!("{ancestor} {part}"));
        }
    }
    scoped.join(", ")
}
