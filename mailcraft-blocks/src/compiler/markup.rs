//! MJML element tree and its deterministic serializer.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::text::{escape_attr, escape_comment};

/// Element attributes. Unset and empty values are never stored; iteration is
/// alphabetical, which keeps serialized output byte-stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(BTreeMap<String, String>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`; `None` or an empty string removes it.
    pub fn set(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(v) if !v.trim().is_empty() => {
                self.0.insert(name.to_string(), v);
            }
            _ => {
                self.0.remove(name);
            }
        }
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, Some(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn write_to(&self, out: &mut String) {
        for (name, value) in &self.0 {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    Element(MjmlElement),
    /// Pre-rendered markup spliced in as-is.
    Raw(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MjmlElement {
    pub tag: String,
    pub attrs: Attrs,
    /// Inline HTML body, already escaped.
    pub content: Option<String>,
    pub children: Vec<Markup>,
}

impl MjmlElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: Attrs::new(),
            content: None,
            children: Vec::new(),
        }
    }

    pub fn with_attrs(tag: &str, attrs: Attrs) -> Self {
        Self {
            attrs,
            ..Self::new(tag)
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn push(&mut self, child: Markup) {
        self.children.push(child);
    }

    pub fn push_element(&mut self, child: MjmlElement) {
        self.children.push(Markup::Element(child));
    }

    /// Serialize with `indent` spaces per nesting level.
    pub fn to_markup(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_to(&mut out, indent, 0);
        out
    }

    /// A node with content emits it inline; a node with children wraps them
    /// one per line; a node with neither emits an empty open/close pair.
    fn write_to(&self, out: &mut String, indent: usize, depth: usize) {
        let pad = " ".repeat(indent * depth);
        out.push_str(&pad);
        out.push('<');
        out.push_str(&self.tag);
        self.attrs.write_to(out);
        out.push('>');

        match &self.content {
            Some(content) if !content.is_empty() => {
                out.push_str(content);
            }
            _ if !self.children.is_empty() => {
                out.push('\n');
                for child in &self.children {
                    child.write_to(out, indent, depth + 1);
                    out.push('\n');
                }
                out.push_str(&pad);
            }
            _ => {}
        }

        let _ = write!(out, "</{}>", self.tag);
    }
}

impl Markup {
    fn write_to(&self, out: &mut String, indent: usize, depth: usize) {
        let pad = " ".repeat(indent * depth);
        match self {
            Markup::Element(el) => el.write_to(out, indent, depth),
            Markup::Raw(raw) => {
                out.push_str(&pad);
                out.push_str(raw.trim());
            }
            Markup::Comment(text) => {
                let _ = write!(out, "{}<!-- {} -->", pad, escape_comment(text));
            }
        }
    }
}
