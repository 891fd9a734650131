//! In-memory [`Document`] used by tests and the CLI.
//!
//! Elements form a tree under a single `body`. Each element holds raw inner
//! markup followed by its child elements; markup written with
//! `set_inner_html` is stored verbatim and not parsed into elements.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::mpsc;

use super::{Document, ElementId, MutationEvent};

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    html: String,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            html: String::new(),
        }
    }
}

/// A document tree kept entirely in memory.
#[derive(Debug)]
pub struct MemoryDocument {
    nodes: HashMap<ElementId, Node>,
    body: ElementId,
    next_id: u64,
    observers: Vec<mpsc::UnboundedSender<MutationEvent>>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    /// An empty document with just a `body`.
    #[must_use]
    pub fn new() -> Self {
        let body = ElementId::new(0);
        let mut nodes = HashMap::new();
        nodes.insert(body, Node::new("body"));
        Self {
            nodes,
            body,
            next_id: 1,
            observers: Vec::new(),
        }
    }

    /// Create an element with attributes and text and attach it to `parent`.
    pub fn append_element(
        &mut self,
        parent: ElementId,
        tag: &str,
        attributes: &[(&str, &str)],
        text: &str,
    ) -> ElementId {
        let element = self.create_element(tag);
        for (name, value) in attributes {
            self.set_attribute(element, name, value);
        }
        if !text.is_empty() {
            self.set_text_content(element, text);
        }
        self.append_child(parent, element);
        element
    }

    /// Serialized markup of the element itself, tag included.
    #[must_use]
    pub fn outer_html(&self, element: ElementId) -> Option<String> {
        let node = self.nodes.get(&element)?;
        let attributes: String = node
            .attributes
            .iter()
            .map(|(name, value)| format!(" {name}=\"{}\"", escape(value)))
            .collect();
        Some(format!(
            "<{tag}{attributes}>{inner}</{tag}>",
            tag = node.tag,
            inner = self.inner_html(element).unwrap_or_default()
        ))
    }

    fn is_connected(&self, element: ElementId) -> bool {
        let mut current = Some(element);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    fn emit(&mut self, event: &MutationEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn collect_descendants(&self, element: ElementId, out: &mut Vec<ElementId>) {
        if let Some(node) = self.nodes.get(&element) {
            for &child in &node.children {
                out.push(child);
                self.collect_descendants(child, out);
            }
        }
    }

    fn detach_children(&mut self, element: ElementId) {
        let connected = self.is_connected(element);
        let children = self
            .nodes
            .get_mut(&element)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in &children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
        }
        if connected && !children.is_empty() {
            self.emit(&MutationEvent::Removed(children));
        }
    }
}

impl Document for MemoryDocument {
    fn query_attribute(&self, name: &str) -> Vec<ElementId> {
        std::iter::once(self.body)
            .chain(self.descendants(self.body))
            .filter(|id| {
                self.nodes
                    .get(id)
                    .is_some_and(|n| n.attributes.contains_key(name))
            })
            .collect()
    }

    fn contains(&self, element: ElementId) -> bool {
        self.is_connected(element)
    }

    fn tag_name(&self, element: ElementId) -> Option<String> {
        self.nodes.get(&element).map(|n| n.tag.clone())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.nodes.get(&element)?.attributes.get(name).cloned()
    }

    fn attributes(&self, element: ElementId) -> BTreeMap<String, String> {
        self.nodes
            .get(&element)
            .map(|n| n.attributes.clone())
            .unwrap_or_default()
    }

    fn set_attribute(&mut self, element: ElementId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(&element) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_attribute(&mut self, element: ElementId, name: &str) {
        if let Some(node) = self.nodes.get_mut(&element) {
            node.attributes.remove(name);
        }
    }

    fn text_content(&self, element: ElementId) -> Option<String> {
        let node = self.nodes.get(&element)?;
        let mut text = strip_tags(&node.html);
        for &child in &node.children {
            text.push_str(&self.text_content(child).unwrap_or_default());
        }
        Some(text)
    }

    fn set_text_content(&mut self, element: ElementId, text: &str) {
        self.set_inner_html(element, &escape(text));
    }

    fn inner_html(&self, element: ElementId) -> Option<String> {
        let node = self.nodes.get(&element)?;
        let mut html = node.html.clone();
        for &child in &node.children {
            html.push_str(&self.outer_html(child).unwrap_or_default());
        }
        Some(html)
    }

    fn set_inner_html(&mut self, element: ElementId, html: &str) {
        if !self.nodes.contains_key(&element) {
            return;
        }
        self.detach_children(element);
        if let Some(node) = self.nodes.get_mut(&element) {
            node.html = html.to_string();
        }
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.nodes.get(&element)?.parent
    }

    fn descendants(&self, element: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        self.collect_descendants(element, &mut out);
        out
    }

    fn create_element(&mut self, tag: &str) -> ElementId {
        let id = ElementId::new(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(tag));
        id
    }

    fn append_child(&mut self, parent: ElementId, child: ElementId) {
        if parent == child
            || !self.nodes.contains_key(&parent)
            || !self.nodes.contains_key(&child)
            || self.descendants(child).contains(&parent)
        {
            return;
        }
        if self.nodes.get(&child).is_some_and(|n| n.parent.is_some()) {
            self.remove(child);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if self.is_connected(parent) {
            self.emit(&MutationEvent::Inserted(vec![child]));
        }
    }

    fn remove(&mut self, element: ElementId) {
        let connected = self.is_connected(element);
        let Some(parent) = self.nodes.get_mut(&element).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != element);
        }
        if connected {
            self.emit(&MutationEvent::Removed(vec![element]));
        }
    }

    fn body(&self) -> ElementId {
        self.body
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MutationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
