//! Generic arena-backed XML tree.
//!
//! Every element of a style document becomes a [`GenericNode`] stored in a
//! flat vector in document (pre-order) position. Nodes refer to their parent
//! and children by index, so parent lookups need no back pointers. The raw
//! inner bytes of every element stay addressable through [`XmlTree::inner_xml`]
//! which lets callers re-decode a fragment (a `Rule`, a `Filter`) on its own.

use std::ops::Range;
use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::StyleError;

pub type NodeId = usize;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct GenericNode {
    /// Local element name, namespace prefix removed.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    content: Range<usize>,
}

/// Controls how [`XmlTree::walk`] continues after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Descend,
    SkipChildren,
    Stop,
}

#[derive(Debug, Clone)]
pub struct XmlTree {
    source: Vec<u8>,
    nodes: Vec<GenericNode>,
}

impl XmlTree {
    /// Builds the tree for a complete document. A leading byte order mark is
    /// dropped; content after the first root element is ignored.
    pub fn parse(bytes: impl Into<Vec<u8>>) -> Result<Self, StyleError> {
        let mut source = bytes.into();
        if source.starts_with(UTF8_BOM) {
            source.drain(..UTF8_BOM.len());
        }
        let nodes = build_nodes(&source)?;
        Ok(Self { source, nodes })
    }

    /// Wraps `inner` in `<tag>...</tag>` and parses the result as a standalone
    /// document.
    pub fn parse_fragment(tag: &str, inner: &[u8]) -> Result<Self, StyleError> {
        let mut wrapped = Vec::with_capacity(inner.len() + 2 * tag.len() + 5);
        wrapped.push(b'<');
        wrapped.extend_from_slice(tag.as_bytes());
        wrapped.push(b'>');
        wrapped.extend_from_slice(inner);
        wrapped.extend_from_slice(b"</");
        wrapped.extend_from_slice(tag.as_bytes());
        wrapped.push(b'>');
        Self::parse(wrapped)
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id].name
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id].children.iter().copied()
    }

    /// Children of `id` whose local name equals `name`.
    pub fn children_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(id).filter(move |child| self.name(*child) == name)
    }

    pub fn first_child_named(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.children_named(id, name).next()
    }

    /// Walks from the parent of `id` up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id]
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Raw bytes between the start and end tag of `id`, byte-for-byte as they
    /// appear in the source.
    pub fn inner_xml(&self, id: NodeId) -> &[u8] {
        &self.source[self.nodes[id].content.clone()]
    }

    /// Trimmed, unescaped text content of a leaf element. Comments are
    /// skipped and CDATA sections are taken verbatim.
    pub fn text(&self, id: NodeId) -> String {
        let raw = String::from_utf8_lossy(self.inner_xml(id));
        let mut text = String::new();
        let mut rest = raw.as_ref();
        while !rest.is_empty() {
            let next_markup = [rest.find("<!--"), rest.find("<![CDATA[")]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(rest.len());
            push_unescaped(&mut text, &rest[..next_markup]);
            rest = &rest[next_markup..];

            if let Some(comment) = rest.strip_prefix("<!--") {
                rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            } else if let Some(cdata) = rest.strip_prefix("<![CDATA[") {
                let end = cdata.find("]]>").unwrap_or(cdata.len());
                text.push_str(&cdata[..end]);
                rest = cdata.get(end + 3..).unwrap_or("");
            }
        }
        text.trim().to_string()
    }

    /// Depth-first, pre-order traversal starting at the root.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&XmlTree, NodeId) -> Walk,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            match visit(self, id) {
                Walk::Stop => return,
                Walk::SkipChildren => {}
                Walk::Descend => stack.extend(self.nodes[id].children.iter().rev().copied()),
            }
        }
    }
}

fn build_nodes(source: &[u8]) -> Result<Vec<GenericNode>, StyleError> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().check_end_names = true;

    let mut nodes: Vec<GenericNode> = Vec::new();
    let mut open: Vec<NodeId> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|err| parse_error(err.to_string()))?;
        let position = reader.buffer_position() as usize;
        match event {
            Event::Start(start) => {
                if open.is_empty() && !nodes.is_empty() {
                    break;
                }
                let id = push_node(&mut nodes, &open, &start, position..position)?;
                open.push(id);
            }
            Event::Empty(start) => {
                if open.is_empty() && !nodes.is_empty() {
                    break;
                }
                push_node(&mut nodes, &open, &start, position..position)?;
                if open.is_empty() {
                    break;
                }
            }
            Event::End(_) => {
                let Some(id) = open.pop() else {
                    return Err(parse_error("unexpected closing tag".to_string()));
                };
                let tag_start = end_tag_start(source, position)
                    .ok_or_else(|| parse_error("closing tag without '</'".to_string()))?;
                let start = nodes[id].content.start;
                nodes[id].content = start..tag_start.max(start);
                if open.is_empty() {
                    break;
                }
            }
            Event::Eof => {
                if let Some(id) = open.last() {
                    return Err(parse_error(format!(
                        "unexpected end of document inside <{}>",
                        nodes[*id].name
                    )));
                }
                break;
            }
            _ => {}
        }
    }

    if nodes.is_empty() {
        return Err(parse_error("document has no root element".to_string()));
    }
    Ok(nodes)
}

fn push_node(
    nodes: &mut Vec<GenericNode>,
    open: &[NodeId],
    start: &BytesStart<'_>,
    content: Range<usize>,
) -> Result<NodeId, StyleError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| parse_error(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = match quick_xml::escape::unescape(&raw) {
            Ok(value) => value.into_owned(),
            Err(_) => raw.into_owned(),
        };
        attributes.push((key, value));
    }

    let id = nodes.len();
    let parent = open.last().copied();
    nodes.push(GenericNode {
        name,
        attributes,
        children: Vec::new(),
        parent,
        content,
    });
    if let Some(parent) = parent {
        nodes[parent].children.push(id);
    }
    Ok(id)
}

fn push_unescaped(text: &mut String, raw: &str) {
    match quick_xml::escape::unescape(raw) {
        Ok(unescaped) => text.push_str(&unescaped),
        Err(_) => text.push_str(raw),
    }
}

/// Offset of the `</` that opens the end tag finishing at `end`.
fn end_tag_start(source: &[u8], end: usize) -> Option<usize> {
    let end = end.min(source.len());
    source[..end].windows(2).rposition(|pair| pair == b"</")
}

fn parse_error(message: String) -> StyleError {
    StyleError::Parse {
        path: PathBuf::new(),
        message,
    }
}
