//! Icon-container selectors.
//!
//! Supports the compound subset that icon markup needs: a tag name (or `*`),
//! `.class`, `#id`, `[attr]` and `[attr=value]`, and comma-separated
//! alternatives. Combinators are rejected.

use super::markup::Element;
use thiserror::Error;

/// Error for selectors outside the supported subset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid icon selector '{selector}': {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if element.name != *tag {
                return false;
            }
        }
        if !self.ids.iter().all(|id| element.attr("id") == Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| element.classes().any(|ec| ec == c)) {
            return false;
        }
        self.attrs.iter().all(|a| match &a.value {
            Some(value) => element.attr(&a.name) == Some(value.as_str()),
            None => element.has_attr(&a.name),
        })
    }
}

/// Parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Compound>,
}

impl Default for Selector {
    /// Any raw graphic element.
    fn default() -> Self {
        Self { alternatives: vec![Compound { tag: Some("svg".to_string()), ..Compound::default() }] }
    }
}

impl Selector {
    pub fn parse(selector: &str) -> Result<Self, SelectorError> {
        let fail = |reason: &str| SelectorError { selector: selector.to_string(), reason: reason.to_string() };

        let mut alternatives = Vec::new();
        for part in selector.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(fail("empty selector"));
            }
            alternatives.push(parse_compound(part).map_err(|reason| fail(&reason))?);
        }
        Ok(Self { alternatives })
    }

    pub fn matches(&self, element: &Element) -> bool {
        self.alternatives.iter().any(|c| c.matches(element))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c == ':'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

fn parse_compound(text: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let mut chars = text.chars().peekable();

    if chars.peek() == Some(&'*') {
        chars.next();
    } else {
        let tag = take_ident(&mut chars);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_ascii_lowercase());
        }
    }

    while let Some(c) = chars.next() {
        match c {
            '.' | '#' => {
                let ident = take_ident(&mut chars);
                if ident.is_empty() {
                    return Err(format!("expected a name after '{}'", c));
                }
                if c == '.' {
                    compound.classes.push(ident);
                } else {
                    compound.ids.push(ident);
                }
            }
            '[' => compound.attrs.push(parse_attr(&mut chars)?),
            c if c.is_whitespace() || c == '>' || c == '+' || c == '~' => {
                return Err("combinators are not supported".to_string());
            }
            c => return Err(format!("unexpected '{}'", c)),
        }
    }
    Ok(compound)
}

fn parse_attr(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<AttrMatch, String> {
    let name = take_ident(chars);
    if name.is_empty() {
        return Err("expected an attribute name after '['".to_string());
    }
    match chars.next() {
        Some(']') => Ok(AttrMatch { name, value: None }),
        Some('=') => {
            let value = match chars.peek() {
                Some(&quote) if quote == '"' || quote == '\'' => {
                    chars.next();
                    chars.by_ref().take_while(|&c| c != quote).collect()
                }
                _ => take_ident(chars),
            };
            match chars.next() {
                Some(']') => Ok(AttrMatch { name, value: Some(value) }),
                _ => Err("expected ']'".to_string()),
            }
        }
        _ => Err("unsupported attribute operator".to_string()),
    }
}
