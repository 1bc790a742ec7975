//! Markup tree for one archive entry
//!
//! Documents are parsed with html5ever into an `RcDom`. Element handles are
//! reference counted, so a handle taken during a scan stays bound to its
//! element and can be used to rewrite that element's children later.

pub mod selector;
mod writer;

use std::rc::Rc;

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, parse_fragment, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use thiserror::Error;

pub use selector::{select_units, TranslationUnit, UnitSelector, TRANSLATABLE_TAGS};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("document is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("failed to serialize markup: {0}")]
    Serialize(#[from] std::io::Error),

    #[error("serialized markup is not valid UTF-8")]
    SerializedUtf8,
}

/// A parsed XHTML/HTML document.
pub struct MarkupDocument {
    dom: RcDom,
    prolog: Option<String>,
}

impl MarkupDocument {
    /// Parses raw entry bytes. A UTF-8 BOM is dropped.
    pub fn parse(bytes: &[u8]) -> Result<Self, MarkupError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let source = std::str::from_utf8(bytes)?;
        Ok(Self::parse_str(source))
    }

    pub fn parse_str(source: &str) -> Self {
        let (prolog, body) = split_xml_prolog(source);
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(body);
        Self {
            dom,
            prolog: prolog.map(str::to_string),
        }
    }

    /// The document node.
    pub fn root(&self) -> &Handle {
        &self.dom.document
    }

    /// The `<?xml …?>` declaration the source started with, if any.
    pub fn prolog(&self) -> Option<&str> {
        self.prolog.as_deref()
    }

    pub fn to_markup(&self) -> Result<String, MarkupError> {
        let body = serialize_children(&self.dom.document)?;
        Ok(match &self.prolog {
            Some(prolog) => format!("{prolog}\n{body}"),
            None => body,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MarkupError> {
        self.to_markup().map(String::into_bytes)
    }
}

/// html5ever would turn an XML declaration into a bogus comment, so it is kept aside.
fn split_xml_prolog(source: &str) -> (Option<&str>, &str) {
    let trimmed = source.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            let (prolog, rest) = trimmed.split_at(end + 2);
            return (Some(prolog), rest);
        }
    }
    (None, source)
}

fn serialize_children(node: &Handle) -> Result<String, MarkupError> {
    let mut buf: Vec<u8> = Vec::new();
    writer::write_children(&mut buf, node)?;
    String::from_utf8(buf).map_err(|_| MarkupError::SerializedUtf8)
}

/// Local tag name of an element node.
pub fn element_name(node: &Handle) -> Option<&str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// Serialized children of `node`, nested elements included as markup.
pub fn inner_markup(node: &Handle) -> Result<String, MarkupError> {
    serialize_children(node)
}

/// Concatenated text of all descendant text nodes.
pub fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// Replaces the children of element `node` with `markup` parsed in its context.
///
/// The element itself, its attributes and its position among its siblings are
/// left as they are. Non-element nodes are ignored.
pub fn replace_inner_markup(node: &Handle, markup: &str) {
    let NodeData::Element { name, .. } = &node.data else {
        return;
    };

    let fragment =
        parse_fragment(RcDom::default(), ParseOpts::default(), name.clone(), Vec::new()).one(markup);
    let new_children: Vec<Handle> = match fragment.document.children.borrow().first() {
        Some(context_root) => context_root.children.take(),
        None => Vec::new(),
    };

    for old in node.children.take() {
        old.parent.set(None);
    }
    for child in &new_children {
        child.parent.set(Some(Rc::downgrade(node)));
    }
    *node.children.borrow_mut() = new_children;
}
