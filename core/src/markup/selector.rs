use markup5ever_rcdom::Handle;

use super::{element_name, inner_markup, replace_inner_markup, text_content, MarkupDocument, MarkupError};

/// Elements whose inner markup is sent to the translation service.
pub const TRANSLATABLE_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "span"];

pub fn is_translatable_tag(tag: &str) -> bool {
    TRANSLATABLE_TAGS.contains(&tag)
}

/// One element selected for translation, bound to its position in the tree.
#[derive(Debug)]
pub struct TranslationUnit {
    index: usize,
    tag: String,
    node: Handle,
    markup: String,
    is_blank: bool,
}

impl TranslationUnit {
    /// Zero-based position in document order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Inner markup captured when the unit was selected.
    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// True when the element's text is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.is_blank
    }

    /// Replaces the element's inner markup, consuming the unit.
    pub fn write_back(self, markup: &str) {
        replace_inner_markup(&self.node, markup);
    }
}

/// Lazy pre-order scan over a document, yielding units one at a time.
///
/// Only the outermost non-blank allow-listed element becomes a unit; anything
/// nested inside it travels in its markup. A blank element does not hide its
/// descendants. Children of a non-blank unit are never queued, so writing a
/// unit back never leaves a queued node detached.
pub struct UnitSelector {
    stack: Vec<Handle>,
    next_index: usize,
}

pub fn select_units(document: &MarkupDocument) -> UnitSelector {
    UnitSelector {
        stack: vec![document.root().clone()],
        next_index: 0,
    }
}

impl UnitSelector {
    fn push_children(&mut self, node: &Handle) {
        for child in node.children.borrow().iter().rev() {
            self.stack.push(child.clone());
        }
    }
}

impl Iterator for UnitSelector {
    type Item = Result<TranslationUnit, MarkupError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            let Some(tag) = element_name(&node)
                .filter(|tag| is_translatable_tag(tag))
                .map(str::to_string)
            else {
                self.push_children(&node);
                continue;
            };

            let is_blank = text_content(&node).trim().is_empty();
            if is_blank {
                self.push_children(&node);
            }

            let markup = match inner_markup(&node) {
                Ok(markup) => markup,
                Err(err) => return Some(Err(err)),
            };

            let unit = TranslationUnit {
                index: self.next_index,
                tag,
                node,
                markup,
                is_blank,
            };
            self.next_index += 1;
            return Some(Ok(unit));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(source: &str) -> Vec<TranslationUnit> {
        let document = MarkupDocument::parse_str(source);
        select_units(&document)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn summary(units: &[TranslationUnit]) -> Vec<(usize, &str, &str, bool)> {
        units
            .iter()
            .map(|unit| (unit.index(), unit.tag(), unit.markup(), unit.is_blank()))
            .collect()
    }

    #[test]
    fn selects_allow_listed_elements_in_document_order() {
        let found = units(
            "<body><h1>Title</h1><div><p>First</p><table><tr><td>cell</td></tr></table></div>\
             <ol><li>item</li></ol><h6>Small</h6></body>",
        );

        assert_eq!(
            summary(&found),
            vec![
                (0, "h1", "Title", false),
                (1, "p", "First", false),
                (2, "li", "item", false),
                (3, "h6", "Small", false),
            ]
        );
    }

    #[test]
    fn blank_elements_are_flagged_not_dropped() {
        let found = units("<body><span>   </span><p>\n\t</p><p><img src=\"a.png\"/></p></body>");

        assert_eq!(found.len(), 3);
        assert!(found.iter().all(TranslationUnit::is_blank));
        assert_eq!(found[2].markup(), "<img src=\"a.png\"/>");
    }

    #[test]
    fn nested_markup_is_captured_verbatim() {
        let found = units("<p class=\"lead\">Hello <em>world</em> <a href=\"#n1\">1</a></p>");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].markup(), "Hello <em>world</em> <a href=\"#n1\">1</a>");
    }

    #[test]
    fn nested_allow_listed_elements_travel_with_their_ancestor() {
        let found = units("<body><p>Outer <span>inner</span></p><li><p>para in item</p></li></body>");

        assert_eq!(
            summary(&found),
            vec![
                (0, "p", "Outer <span>inner</span>", false),
                (1, "li", "<p>para in item</p>", false),
            ]
        );
    }

    #[test]
    fn blank_wrapper_does_not_hide_descendants() {
        let found = units("<body><li> <span> </span> </li></body>");

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].tag(), "li");
        assert_eq!(found[1].tag(), "span");
    }

    #[test]
    fn write_back_replaces_only_that_element() {
        let document = MarkupDocument::parse_str(
            "<body><p id=\"one\">Hello</p><p id=\"two\">Bye</p></body>",
        );
        let mut selector = select_units(&document);
        let first = selector.next().unwrap().unwrap();
        first.write_back("Hallo");

        let markup = document.to_markup().unwrap();
        assert!(markup.contains("<p id=\"one\">Hallo</p><p id=\"two\">Bye</p>"));
        assert_eq!(selector.next().unwrap().unwrap().markup(), "Bye");
        assert!(selector.next().is_none());
    }
}
