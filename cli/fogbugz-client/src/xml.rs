//! Generic XML tree for FogBugz API responses.
//!
//! The API's payloads are irregular: the same tag may carry attributes in one
//! response and plain text in the next, and any element may repeat. Instead of
//! deserializing into fixed structs, responses are parsed into a small tagged
//! tree and the extractors in [crate::extract] walk it explicitly.
//!
//! Conventions of the tree:
//! - child elements are grouped by tag, in document order, and every group is
//!   a sequence, even when the tag occurs once
//! - attributes live in their own map, separate from child elements
//! - an element without attributes and without child elements is collapsed to
//!   [XmlNode::Text]
//! - text is kept exactly as written; trimming is up to the caller

use std::borrow::Cow;

use indexmap::IndexMap;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The response body could not be parsed as XML.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid XML at byte {position}: {message}")]
pub struct XmlParseError {
    pub message: String,
    pub position: u64,
}

/// A parsed document: the root element's tag and its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlDocument {
    pub root_name: String,
    pub root: XmlNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlNode {
    /// An element that only contained text (possibly empty).
    Text(String),
    /// An element with attributes and/or child elements.
    Element(XmlElement),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    pub attributes: IndexMap<String, String>,
    /// Text content, if any non-whitespace text was present next to the
    /// attributes or child elements.
    pub text: Option<String>,
    pub children: IndexMap<String, Vec<XmlNode>>,
}

impl XmlNode {
    /// The content of a text-only element.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlNode::Text(text) => Some(text),
            XmlNode::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Text(_) => None,
            XmlNode::Element(element) => Some(element),
        }
    }

    /// The node's own text, whether it is a text-only element or an element
    /// that also carries attributes.
    pub fn text(&self) -> Option<&str> {
        match self {
            XmlNode::Text(text) => Some(text),
            XmlNode::Element(element) => element.text.as_deref(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.as_element()?.attributes.get(name).map(String::as_str)
    }

    /// All child elements named `tag`, or `None` if there are none.
    pub fn children(&self, tag: &str) -> Option<&[XmlNode]> {
        self.as_element()?.children.get(tag).map(Vec::as_slice)
    }

    /// The first child element named `tag`.
    pub fn first_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children(tag)?.first()
    }

    /// The child element named `tag`, if it occurs exactly once.
    pub fn single_child(&self, tag: &str) -> Option<&XmlNode> {
        unwrap_single(self.children(tag)?)
    }
}

/// Returns the sole element of a length-1 sequence.
pub fn unwrap_single(nodes: &[XmlNode]) -> Option<&XmlNode> {
    match nodes {
        [node] => Some(node),
        _ => None,
    }
}

/// An element whose end tag has not been seen yet.
#[derive(Debug)]
struct OpenElement {
    name: String,
    attributes: IndexMap<String, String>,
    text: String,
    children: IndexMap<String, Vec<XmlNode>>,
}

impl OpenElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = decode_name(start.name().as_ref())?;
        let mut attributes = IndexMap::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = decode_name(attribute.key.as_ref())?;
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            attributes.insert(key, value.into_owned());
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
            children: IndexMap::new(),
        })
    }

    fn finish(self) -> (String, XmlNode) {
        let node = if self.attributes.is_empty() && self.children.is_empty() {
            XmlNode::Text(self.text)
        } else {
            let text = (!self.text.trim().is_empty()).then_some(self.text);
            XmlNode::Element(XmlElement {
                attributes: self.attributes,
                text,
                children: self.children,
            })
        };
        (self.name, node)
    }
}

fn decode_name(raw: &[u8]) -> Result<String, String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| format!("tag or attribute name is not UTF-8: {e}"))
}

/// Parse a complete XML document into an [XmlDocument].
///
/// Fails on any syntax error, on unknown entities, on mismatched or unclosed
/// tags and when the document does not have exactly one root element.
pub fn parse_document(xml: &str) -> Result<XmlDocument, XmlParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, XmlNode)> = None;

    let error_at = |reader: &Reader<&[u8]>, message: String| XmlParseError {
        message,
        position: reader.buffer_position() as u64,
    };

    loop {
        let event = reader
            .read_event()
            .map_err(|e| error_at(&reader, e.to_string()))?;

        match event {
            Event::Start(start) => {
                let element =
                    OpenElement::from_start(&start).map_err(|e| error_at(&reader, e))?;
                stack.push(element);
            },
            Event::Empty(start) => {
                let element =
                    OpenElement::from_start(&start).map_err(|e| error_at(&reader, e))?;
                close_element(&mut stack, &mut root, element)
                    .map_err(|e| error_at(&reader, e))?;
            },
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| error_at(&reader, "unexpected end tag".to_string()))?;
                close_element(&mut stack, &mut root, element)
                    .map_err(|e| error_at(&reader, e))?;
            },
            Event::Text(text) => {
                let text = text.decode().map_err(|e| error_at(&reader, e.to_string()))?;
                push_text(&mut stack, text).map_err(|e| error_at(&reader, e))?;
            },
            Event::CData(cdata) => {
                let text = cdata
                    .decode()
                    .map_err(|e| error_at(&reader, e.to_string()))?;
                push_text(&mut stack, text).map_err(|e| error_at(&reader, e))?;
            },
            Event::GeneralRef(reference) => {
                let resolved = match reference
                    .resolve_char_ref()
                    .map_err(|e| error_at(&reader, e.to_string()))?
                {
                    Some(ch) => Cow::Owned(ch.to_string()),
                    None => {
                        let name = reference
                            .decode()
                            .map_err(|e| error_at(&reader, e.to_string()))?;
                        let entity = resolve_predefined_entity(&name).ok_or_else(|| {
                            error_at(&reader, format!("unknown entity '&{name};'"))
                        })?;
                        Cow::Borrowed(entity)
                    },
                };
                push_text(&mut stack, resolved).map_err(|e| error_at(&reader, e))?;
            },
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {},
        }
    }

    if let Some(open) = stack.last() {
        return Err(error_at(&reader, format!("unclosed element <{}>", open.name)));
    }

    let (root_name, root) =
        root.ok_or_else(|| error_at(&reader, "document has no root element".to_string()))?;
    Ok(XmlDocument { root_name, root })
}

fn close_element(
    stack: &mut [OpenElement],
    root: &mut Option<(String, XmlNode)>,
    element: OpenElement,
) -> Result<(), String> {
    let (name, node) = element.finish();
    match stack.last_mut() {
        Some(parent) => {
            parent.children.entry(name).or_default().push(node);
            Ok(())
        },
        None if root.is_some() => Err(format!("second root element <{name}>")),
        None => {
            *root = Some((name, node));
            Ok(())
        },
    }
}

fn push_text(stack: &mut [OpenElement], text: Cow<'_, str>) -> Result<(), String> {
    match stack.last_mut() {
        Some(open) => {
            open.text.push_str(&text);
            Ok(())
        },
        None if text.trim().is_empty() => Ok(()),
        None => Err("text outside of the root element".to_string()),
    }
}
