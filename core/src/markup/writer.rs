//! Tree writer for archive markup
//!
//! Output has to be readable by both HTML and XML consumers: void elements
//! self-close, the doctype keeps its public and system identifiers, and the
//! only character references produced are the XML predefined ones.

use std::io::{self, Write};

use markup5ever_rcdom::{Handle, NodeData};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "embed", "frame", "hr", "img", "input",
    "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text children are written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

/// Writes the children of `node`, not the node itself.
pub fn write_children<W: Write>(out: &mut W, node: &Handle) -> io::Result<()> {
    let mut raw_text = false;
    if let NodeData::Element {
        name,
        template_contents,
        ..
    } = &node.data
    {
        if let Some(contents) = template_contents.borrow().as_ref() {
            return write_children(out, contents);
        }
        raw_text = RAW_TEXT_ELEMENTS.contains(&name.local.as_ref());
    }

    for child in node.children.borrow().iter() {
        write_node(out, child, raw_text)?;
    }
    Ok(())
}

fn write_node<W: Write>(out: &mut W, node: &Handle, raw_text: bool) -> io::Result<()> {
    match &node.data {
        NodeData::Document => write_children(out, node),
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => {
            write!(out, "<!DOCTYPE {}", name)?;
            if !public_id.is_empty() {
                write!(out, " PUBLIC \"{}\"", public_id)?;
            }
            if !system_id.is_empty() {
                if public_id.is_empty() {
                    out.write_all(b" SYSTEM")?;
                }
                write!(out, " \"{}\"", system_id)?;
            }
            out.write_all(b">")
        }
        NodeData::Text { contents } => {
            let text = contents.borrow();
            if raw_text {
                out.write_all(text.as_bytes())
            } else {
                write_escaped(out, &text, false)
            }
        }
        NodeData::Comment { contents } => write!(out, "<!--{}-->", contents),
        NodeData::ProcessingInstruction { target, contents } => {
            write!(out, "<?{} {}?>", target, contents)
        }
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.as_ref();
            write!(out, "<{}", tag)?;
            for attr in attrs.borrow().iter() {
                out.write_all(b" ")?;
                if let Some(prefix) = &attr.name.prefix {
                    write!(out, "{}:", prefix)?;
                }
                write!(out, "{}=\"", attr.name.local)?;
                write_escaped(out, &attr.value, true)?;
                out.write_all(b"\"")?;
            }

            if VOID_ELEMENTS.contains(&tag) {
                return out.write_all(b"/>");
            }
            out.write_all(b">")?;
            write_children(out, node)?;
            write!(out, "</{}>", tag)
        }
    }
}

/// Escapes `&`, `<`, `>` in text and `&`, `"` in attribute values. Everything
/// else, U+00A0 included, is written as the literal character.
fn write_escaped<W: Write>(out: &mut W, text: &str, attribute: bool) -> io::Result<()> {
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        let replacement = match ch {
            '&' => "&amp;",
            '<' if !attribute => "&lt;",
            '>' if !attribute => "&gt;",
            '"' if attribute => "&quot;",
            _ => continue,
        };
        out.write_all(text[start..index].as_bytes())?;
        out.write_all(replacement.as_bytes())?;
        start = index + ch.len_utf8();
    }
    out.write_all(text[start..].as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::MarkupDocument;

    fn rewrite(source: &str) -> String {
        let document = MarkupDocument::parse_str(source);
        let mut buf = Vec::new();
        write_children(&mut buf, document.root()).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn void_elements_self_close() {
        let markup = rewrite("<body><p>one<br>two</p><img src=\"a.png\" alt=\"\"></body>");
        assert!(markup.contains("<p>one<br/>two</p><img src=\"a.png\" alt=\"\"/>"));
    }

    #[test]
    fn text_and_attributes_are_escaped() {
        let markup = rewrite("<body><p title=\"a &quot;b&quot; &amp; c\">1 &lt; 2 &amp;&amp; 3 &gt; 2</p></body>");
        assert!(markup.contains("<p title=\"a &quot;b&quot; &amp; c\">1 &lt; 2 &amp;&amp; 3 &gt; 2</p>"));
    }

    #[test]
    fn raw_text_is_written_verbatim() {
        let markup = rewrite("<head><style>p > em { color: red; }</style></head><body><!-- a & b --></body>");
        assert!(markup.contains("<style>p > em { color: red; }</style>"));
        assert!(markup.contains("<!-- a & b -->"));
    }

    #[test]
    fn doctype_with_only_a_system_identifier() {
        let markup = rewrite("<!DOCTYPE html SYSTEM \"about:legacy-compat\"><p>x</p>");
        assert!(markup.starts_with("<!DOCTYPE html SYSTEM \"about:legacy-compat\"><html>"));
    }
}
