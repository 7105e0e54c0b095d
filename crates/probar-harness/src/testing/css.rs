//! CSS selector matching for the in-memory document.
//!
//! Supported: type, universal, `#id`, `.class`, attribute conditions
//! (`[a]`, `[a=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]`, `[a~=v]`), descendant and
//! child combinators, and selector lists. Anything else is rejected with
//! [`HarnessError::InvalidSelector`].

use crate::result::{HarnessError, HarnessResult};
use crate::selector::split_selector_list;

/// Read access to an element tree.
pub(crate) trait NodeView {
    type Id: Copy;

    fn tag_name(&self, node: Self::Id) -> &str;
    fn attribute(&self, node: Self::Id, name: &str) -> Option<&str>;
    fn parent_element(&self, node: Self::Id) -> Option<Self::Id>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    Includes { key: String, value: String },
}

impl AttrCondition {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        match self {
            Self::Exists { .. } => true,
            Self::Eq { value, .. } => actual == value,
            Self::StartsWith { value, .. } => !value.is_empty() && actual.starts_with(value.as_str()),
            Self::EndsWith { value, .. } => !value.is_empty() && actual.ends_with(value.as_str()),
            Self::Contains { value, .. } => !value.is_empty() && actual.contains(value.as_str()),
            Self::Includes { value, .. } => actual.split_whitespace().any(|token| token == value),
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Exists { key }
            | Self::Eq { key, .. }
            | Self::StartsWith { key, .. }
            | Self::EndsWith { key, .. }
            | Self::Contains { key, .. }
            | Self::Includes { key, .. } => key,
        }
    }
}

/// One compound selector: `div#main.a.b[href]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    compound: Compound,
    /// Relation to the part on the left
    combinator: Option<Combinator>,
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SelectorList {
    groups: Vec<Vec<Part>>,
}

impl SelectorList {
    pub(crate) fn parse(selector: &str) -> HarnessResult<Self> {
        let invalid = || HarnessError::InvalidSelector {
            selector: selector.to_string(),
        };
        let groups = split_selector_list(selector)
            .into_iter()
            .map(|group| parse_chain(group).ok_or_else(invalid))
            .collect::<HarnessResult<Vec<_>>>()?;
        if groups.is_empty() {
            return Err(invalid());
        }
        Ok(Self { groups })
    }

    pub(crate) fn matches<T: NodeView>(&self, tree: &T, node: T::Id) -> bool {
        self.groups.iter().any(|chain| matches_chain(tree, node, chain))
    }
}

fn matches_chain<T: NodeView>(tree: &T, node: T::Id, chain: &[Part]) -> bool {
    let Some((last, rest)) = chain.split_last() else {
        return false;
    };
    if !matches_compound(tree, node, &last.compound) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match last.combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => tree
            .parent_element(node)
            .is_some_and(|parent| matches_chain(tree, parent, rest)),
        Combinator::Descendant => {
            let mut cursor = tree.parent_element(node);
            while let Some(ancestor) = cursor {
                if matches_chain(tree, ancestor, rest) {
                    return true;
                }
                cursor = tree.parent_element(ancestor);
            }
            false
        }
    }
}

fn matches_compound<T: NodeView>(tree: &T, node: T::Id, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if !tree.tag_name(node).eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if tree.attribute(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    let classes = tree.attribute(node, "class").unwrap_or_default();
    if !compound
        .classes
        .iter()
        .all(|class| classes.split_whitespace().any(|c| c == class))
    {
        return false;
    }
    compound
        .attrs
        .iter()
        .all(|condition| condition.matches(tree.attribute(node, condition.key())))
}

fn parse_chain(selector: &str) -> Option<Vec<Part>> {
    let mut parts: Vec<Part> = Vec::new();
    let mut pending = None;
    for token in tokenize(selector)? {
        if token == ">" {
            if pending.is_some() || parts.is_empty() {
                return None;
            }
            pending = Some(Combinator::Child);
            continue;
        }
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part {
            compound: parse_compound(&token)?,
            combinator,
        });
    }
    if parts.is_empty() || pending.is_some() {
        return None;
    }
    Some(parts)
}

/// Split on whitespace and `>` outside brackets and quotes.
fn tokenize(selector: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut brackets = 0usize;
    let mut quote: Option<char> = None;

    fn flush(current: &mut String, tokens: &mut Vec<String>) {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    }

    for ch in selector.chars() {
        if let Some(open) = quote {
            current.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' if brackets > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                brackets += 1;
                current.push(ch);
            }
            ']' => {
                brackets = brackets.checked_sub(1)?;
                current.push(ch);
            }
            '>' if brackets == 0 => {
                flush(&mut current, &mut tokens);
                tokens.push(">".to_string());
            }
            '+' | '~' | '(' | ')' | ':' if brackets == 0 => return None,
            ch if ch.is_whitespace() && brackets == 0 => flush(&mut current, &mut tokens),
            _ => current.push(ch),
        }
    }
    if brackets != 0 || quote.is_some() {
        return None;
    }
    flush(&mut current, &mut tokens);
    Some(tokens)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

fn take_ident(input: &str) -> Option<(String, &str)> {
    let end = input.find(|ch: char| !is_ident_char(ch)).unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some((input[..end].to_string(), &input[end..]))
}

fn parse_compound(token: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut rest = token;

    if let Some(after) = rest.strip_prefix('*') {
        rest = after;
    } else if rest.starts_with(is_ident_char) {
        let (tag, after) = take_ident(rest)?;
        compound.tag = Some(tag);
        rest = after;
    }

    while let Some(first) = rest.chars().next() {
        match first {
            '#' => {
                let (id, after) = take_ident(&rest[1..])?;
                if compound.id.replace(id).is_some() {
                    return None;
                }
                rest = after;
            }
            '.' => {
                let (class, after) = take_ident(&rest[1..])?;
                compound.classes.push(class);
                rest = after;
            }
            '[' => {
                let close = find_attr_end(rest)?;
                compound.attrs.push(parse_attr(&rest[1..close])?);
                rest = &rest[close + 1..];
            }
            _ => return None,
        }
    }
    Some(compound)
}

/// Index of the `]` closing the attribute condition at the start of `input`.
fn find_attr_end(input: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (index, ch) in input.char_indices().skip(1) {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, ']') => return Some(index),
            (None, _) => {}
        }
    }
    None
}

fn parse_attr(body: &str) -> Option<AttrCondition> {
    let body = body.trim();
    let Some(eq) = body.find('=') else {
        let (key, rest) = take_ident(body)?;
        return rest.is_empty().then_some(AttrCondition::Exists { key });
    };

    let (name, operator) = match body[..eq].chars().last() {
        Some(op @ ('^' | '$' | '*' | '~')) => (&body[..eq - 1], Some(op)),
        _ => (&body[..eq], None),
    };
    let (key, leftover) = take_ident(name.trim())?;
    if !leftover.is_empty() {
        return None;
    }
    let value = unquote(body[eq + 1..].trim())?;

    Some(match operator {
        None => AttrCondition::Eq { key, value },
        Some('^') => AttrCondition::StartsWith { key, value },
        Some('$') => AttrCondition::EndsWith { key, value },
        Some('*') => AttrCondition::Contains { key, value },
        Some(_) => AttrCondition::Includes { key, value },
    })
}

fn unquote(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    match chars.next() {
        Some(open @ ('"' | '\'')) => {
            let inner = raw[1..].strip_suffix(open)?;
            Some(inner.replace(&format!("\\{open}"), &open.to_string()))
        }
        Some(_) => {
            let (ident, rest) = take_ident(raw)?;
            rest.is_empty().then_some(ident)
        }
        None => None,
    }
}
