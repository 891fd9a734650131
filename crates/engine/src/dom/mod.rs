//! The document port.
//!
//! The engine never touches a real browser. Everything it needs from the host
//! page goes through [`Document`]: finding addressed elements, reading and
//! writing attributes, styles, text and markup, and a channel of structural
//! mutations. Writes to an element that is no longer attached are ignored,
//! the same way a browser tolerates writes to a detached node.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use memory::MemoryDocument;

/// Handle to one element of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(u64);

impl ElementId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attributes and inner markup of an element, as first seen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementMarkup {
    pub attributes: BTreeMap<String, String>,
    pub inner_html: String,
}

/// Structural change reported by a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// Elements were attached. Their descendants came with them.
    Inserted(Vec<ElementId>),
    /// Elements were detached.
    Removed(Vec<ElementId>),
}

/// Host page access.
pub trait Document: Send {
    /// Attached elements carrying attribute `name`, in document order.
    fn query_attribute(&self, name: &str) -> Vec<ElementId>;

    /// Whether the element is still attached to the document.
    fn contains(&self, element: ElementId) -> bool;

    /// Lowercase tag name.
    fn tag_name(&self, element: ElementId) -> Option<String>;

    fn attribute(&self, element: ElementId, name: &str) -> Option<String>;

    fn attributes(&self, element: ElementId) -> BTreeMap<String, String>;

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str);

    fn remove_attribute(&mut self, element: ElementId, name: &str);

    /// Visible text, with markup stripped.
    fn text_content(&self, element: ElementId) -> Option<String>;

    /// Replace the element's content with literal text.
    fn set_text_content(&mut self, element: ElementId, text: &str);

    fn inner_html(&self, element: ElementId) -> Option<String>;

    fn set_inner_html(&mut self, element: ElementId, html: &str);

    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// Every element below `element`, in document order.
    fn descendants(&self, element: ElementId) -> Vec<ElementId>;

    /// Create a detached element.
    fn create_element(&mut self, tag: &str) -> ElementId;

    /// Attach `child` as the last child of `parent`, moving it if needed.
    fn append_child(&mut self, parent: ElementId, child: ElementId);

    /// Detach `element` from its parent.
    fn remove(&mut self, element: ElementId);

    fn body(&self) -> ElementId;

    /// Receive structural mutations from now on.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MutationEvent>;

    /// Read one inline style property.
    fn style(&self, element: ElementId, property: &str) -> Option<String> {
        let style = self.attribute(element, "style")?;
        parse_style(&style)
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    }

    /// Write one inline style property, keeping the others. An empty value
    /// removes the property.
    fn set_style(&mut self, element: ElementId, property: &str, value: &str) {
        let mut declarations = self
            .attribute(element, "style")
            .map(|s| parse_style(&s))
            .unwrap_or_default();
        let existing = declarations
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(property));
        match (existing, value.is_empty()) {
            (Some(i), true) => {
                declarations.remove(i);
            }
            (Some(i), false) => {
                if let Some(declaration) = declarations.get_mut(i) {
                    declaration.1 = value.to_string();
                }
            }
            (None, false) => declarations.push((property.to_string(), value.to_string())),
            (None, true) => {}
        }
        if declarations.is_empty() {
            self.remove_attribute(element, "style");
        } else {
            self.set_attribute(element, "style", &render_style(&declarations));
        }
    }

    /// Snapshot of the element's attributes and inner markup.
    fn capture(&self, element: ElementId) -> Option<ElementMarkup> {
        Some(ElementMarkup {
            attributes: self.attributes(element),
            inner_html: self.inner_html(element)?,
        })
    }

    /// Put back a snapshot taken with [`Document::capture`].
    fn restore(&mut self, element: ElementId, markup: &ElementMarkup) {
        let current = self.attributes(element);
        for name in current.keys().filter(|k| !markup.attributes.contains_key(*k)) {
            self.remove_attribute(element, name);
        }
        for (name, value) in &markup.attributes {
            self.set_attribute(element, name, value);
        }
        self.set_inner_html(element, &markup.inner_html);
    }
}

/// Split declarations on `;`, ignoring semicolons inside `url(...)` or quotes
/// (data URLs contain them).
fn split_declarations(style: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        match (c, quote) {
            ('"' | '\'', None) => quote = Some(c),
            (c, Some(q)) if c == q => quote = None,
            ('(', None) => depth += 1,
            (')', None) => depth = depth.saturating_sub(1),
            (';', None) if depth == 0 => {
                parts.extend(style.get(start..i));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.extend(style.get(start..));
    parts
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    split_declarations(style)
        .into_iter()
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn render_style(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_roundtrip() {
        let mut doc = MemoryDocument::new();
        let el = doc.create_element("div");
        doc.set_attribute(el, "style", "color: red; margin:0");

        doc.set_style(el, "background-image", "url(\"a.png\")");
        assert_eq!(doc.style(el, "color").as_deref(), Some("red"));
        assert_eq!(
            doc.style(el, "background-image").as_deref(),
            Some("url(\"a.png\")")
        );

        doc.set_style(el, "color", "");
        assert_eq!(doc.style(el, "color"), None);
        assert_eq!(doc.style(el, "margin").as_deref(), Some("0"));
    }

    #[test]
    fn test_style_keeps_data_urls_whole() {
        let mut doc = MemoryDocument::new();
        let el = doc.create_element("div");
        let value = "url(\"data:image/png;base64,AQID\")";
        doc.set_style(el, "background-image", value);
        doc.set_style(el, "color", "blue");
        assert_eq!(doc.style(el, "background-image").as_deref(), Some(value));
        assert_eq!(doc.style(el, "color").as_deref(), Some("blue"));
    }

    #[test]
    fn test_capture_and_restore() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let el = doc.create_element("h1");
        doc.append_child(body, el);
        doc.set_attribute(el, "class", "title");
        doc.set_inner_html(el, "Hola <b>mundo</b>");

        let original = doc.capture(el).unwrap_or_default();
        doc.set_attribute(el, "data-extra", "1");
        doc.set_text_content(el, "Otro");

        doc.restore(el, &original);
        assert_eq!(doc.capture(el), Some(original));
    }
}
