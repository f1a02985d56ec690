//! Sprite document model and rendering.

use serde::Serialize;
use std::collections::HashMap;

/// viewBox used when an icon does not declare one.
pub const DEFAULT_VIEW_BOX: &str = "0 0 18 18";

/// One icon extracted from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconRecord {
    pub id: String,
    pub view_box: String,
    /// Children of the graphic element, verbatim
    pub inner: String,
}

/// Icons keyed by id, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SpriteDocument {
    icons: Vec<IconRecord>,
    index: HashMap<String, usize>,
}

impl SpriteDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an icon. The first record for an id wins; returns false if the id
    /// was already present.
    pub fn insert(&mut self, icon: IconRecord) -> bool {
        if self.index.contains_key(&icon.id) {
            return false;
        }
        self.index.insert(icon.id.clone(), self.icons.len());
        self.icons.push(icon);
        true
    }

    pub fn get(&self, id: &str) -> Option<&IconRecord> {
        self.index.get(id).map(|&i| &self.icons[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IconRecord> {
        self.icons.iter()
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// Render the sprite file: one `<symbol>` per icon inside `<defs>`,
    /// followed by one `<use>` per icon.
    pub fn render(&self) -> String {
        let mut out = String::from(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" xmlns:xlink=\"http://www.w3.org/1999/xlink\">\n<defs>\n",
        );
        for icon in &self.icons {
            out.push_str(&format!(
                "<symbol id=\"{}\" viewBox=\"{}\">{}</symbol>\n",
                escape_attr(&icon.id),
                escape_attr(&icon.view_box),
                icon.inner
            ));
        }
        out.push_str("</defs>\n");
        for icon in &self.icons {
            out.push_str(&format!("<use href=\"#{}\"/>\n", escape_attr(&icon.id)));
        }
        out.push_str("</svg>\n");
        out
    }
}

/// Escape a value for a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
    }
    out
}
