//! Minimal document trees for HTML and XML response bodies.
//!
//! XML is parsed strictly: mismatched tags or a missing root element are
//! errors. HTML is parsed leniently into a fragment (a list of top-level
//! nodes): void elements need no closing tag, stray closing tags are dropped
//! and unclosed elements are closed at the end of input.

use std::borrow::Cow;
use std::str;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use serde::Serialize;

use crate::ResponseError;

/// HTML elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// A node of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Node {
    Element(Element),
    Text { text: String },
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text { .. } => None,
        }
    }

    /// Concatenated text content of this node and its descendants.
    pub fn text(&self) -> String {
        match self {
            Node::Element(e) => e.text(),
            Node::Text { text } => text.clone(),
        }
    }
}

/// An element with its attributes (in document order) and children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Element {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First descendant element (depth-first) with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if let Node::Element(e) = child {
                if e.name == name {
                    return Some(e);
                }
                if let Some(found) = e.find(name) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn text(&self) -> String {
        self.children.iter().map(Node::text).collect()
    }
}

/// Accumulates nodes while walking parser events.
#[derive(Default)]
struct TreeBuilder {
    roots: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn open(&mut self, element: Element) {
        self.open.push(element);
    }

    /// Closes the innermost open element named `name`, along with anything
    /// opened inside it. Returns `false` when no such element is open.
    fn close(&mut self, name: &str) -> bool {
        let Some(pos) = self.open.iter().rposition(|e| e.name == name) else {
            return false;
        };
        while self.open.len() > pos {
            if let Some(done) = self.open.pop() {
                self.push(Node::Element(done));
            }
        }
        true
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(done) = self.open.pop() {
            self.push(Node::Element(done));
        }
        self.roots
    }
}

/// Parses an XML document and returns its root element.
pub fn parse_xml(input: &str) -> Result<Element, ResponseError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut tree = TreeBuilder::default();
    loop {
        let event = reader.read_event().map_err(|e| {
            ResponseError::Xml(format!("at position {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(ref e) => tree.open(xml_element(e)?),
            Event::Empty(ref e) => tree.push(Node::Element(xml_element(e)?)),
            Event::End(ref e) => {
                let name = utf8_name(e.name().as_ref())?;
                tree.close(&name);
            }
            Event::Text(ref t) => {
                if !tree.open.is_empty() {
                    let text = t
                        .unescape()
                        .map_err(|e| ResponseError::Xml(e.to_string()))?;
                    tree.push(Node::Text {
                        text: text.into_owned(),
                    });
                }
            }
            Event::CData(ref c) => {
                if !tree.open.is_empty() {
                    tree.push(Node::Text {
                        text: String::from_utf8_lossy(c).into_owned(),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !tree.open.is_empty() {
        return Err(ResponseError::Xml("unexpected end of document".into()));
    }

    let mut roots = tree
        .roots
        .into_iter()
        .filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text { .. } => None,
        });
    let root = roots
        .next()
        .ok_or_else(|| ResponseError::Xml("document has no root element".into()))?;
    if roots.next().is_some() {
        return Err(ResponseError::Xml("document has more than one root element".into()));
    }
    Ok(root)
}

/// Parses an HTML fragment into its top-level nodes.
///
/// Never fails: on a syntax error the nodes parsed so far are returned.
pub fn parse_html(input: &str) -> Vec<Node> {
    let mut reader = Reader::from_str(input);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut tree = TreeBuilder::default();
    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    position = reader.buffer_position(),
                    error = %e,
                    "stopping HTML parse early"
                );
                break;
            }
        };
        match event {
            Event::Start(ref e) => {
                let element = html_element(e);
                if VOID_ELEMENTS.contains(&element.name.as_str()) {
                    tree.push(Node::Element(element));
                } else {
                    tree.open(element);
                }
            }
            Event::Empty(ref e) => tree.push(Node::Element(html_element(e))),
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
                tree.close(&name);
            }
            Event::Text(ref t) => tree.push(Node::Text {
                text: html_text(t).into_owned(),
            }),
            Event::CData(ref c) => tree.push(Node::Text {
                text: String::from_utf8_lossy(c).into_owned(),
            }),
            Event::Eof => break,
            _ => {}
        }
    }
    tree.finish()
}

fn utf8_name(bytes: &[u8]) -> Result<String, ResponseError> {
    str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| ResponseError::Xml("invalid UTF-8 in tag name".into()))
}

fn xml_element(start: &BytesStart<'_>) -> Result<Element, ResponseError> {
    let mut element = Element::new(utf8_name(start.name().as_ref())?);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ResponseError::Xml(e.to_string()))?;
        let key = utf8_name(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| ResponseError::Xml(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn html_element(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase();
    let mut element = Element::new(name);
    for attr in start.html_attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        element.attributes.push((key, value));
    }
    element
}

/// HTML text may contain entities XML does not know (`&nbsp;`); keep it raw then.
fn html_text<'a>(text: &'a BytesText<'_>) -> Cow<'a, str> {
    match text.unescape() {
        Ok(s) => s,
        Err(_) => String::from_utf8_lossy(text).into_owned().into(),
    }
}
