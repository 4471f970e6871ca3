//! Markdown documentation into a heading hierarchy of document nodes.

use codelore_graph::{DocumentNode, Relation};
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};

/// Structural element of a documentation page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    Heading(HeadingLevel),
    Paragraph,
    Code,
}

impl Element {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Heading(HeadingLevel::H1) => "h1",
            Self::Heading(HeadingLevel::H2) => "h2",
            Self::Heading(HeadingLevel::H3) => "h3",
            Self::Heading(HeadingLevel::H4) => "h4",
            Self::Heading(HeadingLevel::H5) => "h5",
            Self::Heading(HeadingLevel::H6) => "h6",
            Self::Paragraph => "p",
            Self::Code => "pre",
        }
    }
}

/// Flat `(element, text)` items in document order. Empty blocks are skipped.
#[must_use]
pub fn parse_elements(markdown: &str) -> Vec<(Element, String)> {
    let mut items = Vec::new();
    let mut current: Option<(Element, String)> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((Element::Heading(level), String::new()));
            }
            // tight list items carry their text without a paragraph
            Event::Start(Tag::Paragraph | Tag::Item) if current.is_none() => {
                current = Some((Element::Paragraph, String::new()));
            }
            Event::Start(Tag::CodeBlock(_)) => current = Some((Element::Code, String::new())),
            Event::Text(t) | Event::Code(t) => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, buf)) = current.as_mut() {
                    buf.push(' ');
                }
            }
            Event::End(
                TagEnd::Heading(_) | TagEnd::Paragraph | TagEnd::Item | TagEnd::CodeBlock,
            ) => {
                if let Some((element, buf)) = current.take() {
                    let text = buf.trim();
                    if !text.is_empty() {
                        items.push((element, text.to_owned()));
                    }
                }
            }
            _ => {}
        }
    }
    items
}

fn document_id(url: &str, position: usize, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(url.as_bytes());
    hasher.update(position.to_string().as_bytes());
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex()[..10].to_owned()
}

/// Build the document nodes of one page.
///
/// A heading closes every open heading of the same or a deeper level and
/// nests under whatever heading is left. Paragraphs and code blocks belong to
/// the innermost open heading; before the first heading they are dropped.
#[must_use]
pub fn document_nodes(url: &str, markdown: &str) -> Vec<DocumentNode> {
    let mut nodes: Vec<DocumentNode> = Vec::new();
    // (level, index into `nodes`)
    let mut open: Vec<(HeadingLevel, usize)> = Vec::new();

    for (position, (element, content)) in parse_elements(markdown).into_iter().enumerate() {
        if let Element::Heading(level) = element {
            while open.last().is_some_and(|(l, _)| *l >= level) {
                open.pop();
            }
        } else if open.is_empty() {
            continue;
        }

        let node = DocumentNode {
            id: document_id(url, position, &content),
            url: url.to_owned(),
            element: element.tag().to_owned(),
            content,
            relations: Vec::new(),
            content_embeddings: Vec::new(),
        };
        if let Some(&(_, parent)) = open.last() {
            nodes[parent].relations.push(Relation::contains(node.id.clone()));
        }
        if let Element::Heading(level) = element {
            open.push((level, nodes.len()));
        }
        nodes.push(node);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
intro without heading

# Guide

Welcome.

## Install

Run `cargo install`.

```sh
codelore ingest .
```

## Usage

Ask questions.

# Reference
";

    fn by_content<'a>(nodes: &'a [DocumentNode], content: &str) -> &'a DocumentNode {
        nodes.iter().find(|n| n.content == content).unwrap()
    }

    fn children<'a>(nodes: &'a [DocumentNode], parent: &DocumentNode) -> Vec<&'a str> {
        parent
            .relations
            .iter()
            .map(|r| nodes.iter().find(|n| n.id == r.target).unwrap().content.as_str())
            .collect()
    }

    #[test]
    fn elements_in_order() {
        let tags: Vec<_> = parse_elements(PAGE).iter().map(|(e, _)| e.tag()).collect();
        assert_eq!(tags, ["p", "h1", "p", "h2", "p", "pre", "h2", "p", "h1"]);
    }

    #[test]
    fn inline_code_is_kept_in_text() {
        let items = parse_elements("Run `cargo install` now.");
        assert_eq!(items[0].1, "Run cargo install now.");
    }

    #[test]
    fn list_items_become_paragraphs() {
        let items = parse_elements("# Title\n\n- first item\n- second `item`\n");
        assert_eq!(
            items,
            [
                (Element::Heading(HeadingLevel::H1), "Title".to_owned()),
                (Element::Paragraph, "first item".to_owned()),
                (Element::Paragraph, "second item".to_owned()),
            ]
        );

        let loose = parse_elements("- one\n\n- two\n");
        let texts: Vec<_> = loose.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, ["one", "two"]);

        let nodes = document_nodes("docs/list.md", "# Title\n\n- first item\n- second item\n");
        assert_eq!(children(&nodes, &nodes[0]), ["first item", "second item"]);
    }

    #[test]
    fn hierarchy_follows_heading_levels() {
        let nodes = document_nodes("docs/guide.md", PAGE);
        assert_eq!(nodes.len(), 8);
        assert!(nodes.iter().all(|n| n.content != "intro without heading"));

        let guide = by_content(&nodes, "Guide");
        assert_eq!(children(&nodes, guide), ["Welcome.", "Install", "Usage"]);
        let install = by_content(&nodes, "Install");
        assert_eq!(children(&nodes, install), ["Run cargo install.", "codelore ingest ."]);
        assert!(by_content(&nodes, "Reference").relations.is_empty());
    }

    #[test]
    fn ids_are_deterministic_and_short() {
        let a = document_nodes("docs/guide.md", PAGE);
        let b = document_nodes("docs/guide.md", PAGE);
        assert_eq!(a, b);
        assert!(a.iter().all(|n| n.id.len() == 10));
        let other = document_nodes("docs/other.md", PAGE);
        assert_ne!(a[0].id, other[0].id);
    }

    #[test]
    fn elements_carry_tags_and_url() {
        let nodes = document_nodes("readme.md", "### Deep\n\ntext");
        assert_eq!(nodes[0].element, "h3");
        assert_eq!(nodes[1].element, "p");
        assert!(nodes.iter().all(|n| n.url == "readme.md"));
    }
}
