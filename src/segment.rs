//! Block segmentation: turns an extracted fragment into a flat, ordered run of
//! independently hideable blocks.
//!
//! The fragment root is the first element inside the overlay content
//! container. From it we pick a target node (a `<pre>` if there is one,
//! otherwise the innermost single-child wrapper), strip injected UI controls,
//! then either keep existing block-level children as blocks or split the
//! target's inline content into lines and group them four at a time.

use crate::dom::{Element, Node};

pub const BLOCK_CLASS: &str = "gpm-editable-block";
pub const BLOCK_ATTR: &str = "data-gpm-id";
pub const HIDDEN_CLASS: &str = "gpm-hidden-block";

pub const LINES_PER_BLOCK: usize = 4;

const BLOCK_TAGS: &[&str] = &["div", "p", "section", "table", "ul", "ol"];
const WRAPPER_TAGS: &[&str] = &["div", "section"];
const UI_CONTROL_MAX_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// An existing structural child kept as-is.
    Verbatim,
    /// A chunk of split lines.
    Lines(usize),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: usize,
    pub kind: BlockKind,
    pub element: Element,
}

impl Block {
    pub fn hidden(&self) -> bool {
        self.element.has_class(HIDDEN_CLASS)
    }
}

/// Segment the content of `container` in place, replacing it with the blocks.
/// Returns the number of blocks. Content that is already segmented is left
/// alone, so calling this twice is harmless.
pub fn segment_into(container: &mut Element) -> usize {
    if let Some(count) = existing_blocks(container) {
        return count;
    }
    let Some(root) = container.first_element_child() else {
        container.children.clear();
        return 0;
    };
    let blocks = segment(root);
    let count = blocks.len();
    container.children = blocks.into_iter().map(|b| Node::Element(b.element)).collect();
    count
}

/// Blocks already present in `container`, if every element child carries a
/// block marker.
fn existing_blocks(container: &Element) -> Option<usize> {
    let mut count = 0;
    for child in container.element_children() {
        child.attr(BLOCK_ATTR)?;
        count += 1;
    }
    (count > 0).then_some(count)
}

/// Segment a fragment root into blocks with ids `0..n` in document order.
pub fn segment(root: &Element) -> Vec<Block> {
    let mut target = select_target(root).clone();

    if target.is("pre") {
        strip_ui_controls(&mut target);
    }

    if target.children.is_empty() {
        return Vec::new();
    }

    let has_block_children = target
        .element_children()
        .any(|c| BLOCK_TAGS.iter().any(|t| c.is(t)));

    if has_block_children && !target.is("pre") {
        return target
            .element_children()
            .enumerate()
            .map(|(id, child)| {
                let mut element = child.clone();
                mark(&mut element, id);
                Block {
                    id,
                    kind: BlockKind::Verbatim,
                    element,
                }
            })
            .collect();
    }

    let lines = split_lines(&target.children);
    lines
        .chunks(LINES_PER_BLOCK)
        .enumerate()
        .map(|(id, chunk)| Block {
            id,
            kind: BlockKind::Lines(chunk.len()),
            element: line_block(&target, chunk, id),
        })
        .collect()
}

/// Read back the blocks of an already segmented container.
pub fn blocks_of(container: &Element) -> Vec<Block> {
    container
        .element_children()
        .filter_map(|el| {
            let id = el.attr(BLOCK_ATTR)?.parse().ok()?;
            let kind = if el.has_class(BLOCK_CLASS) && el.attr("style").is_some_and(|s| s.contains("pre-wrap")) {
                BlockKind::Lines(count_lines(el))
            } else {
                BlockKind::Verbatim
            };
            Some(Block {
                id,
                kind,
                element: el.clone(),
            })
        })
        .collect()
}

fn count_lines(block: &Element) -> usize {
    1 + block.element_children().filter(|c| c.is("br")).count()
}

fn select_target(root: &Element) -> &Element {
    if root.is("pre") {
        return root;
    }
    if let Some(pre) = root.find_descendant(&|e| e.is("pre")) {
        return pre;
    }
    let mut target = root;
    loop {
        let mut kids = target.element_children();
        match (kids.next(), kids.next()) {
            (Some(only), None) if WRAPPER_TAGS.iter().any(|t| only.is(t)) => target = only,
            _ => return target,
        }
    }
}

/// Sites inject close buttons and similar widgets into the tab `<pre>`;
/// they show up as divs holding a glyph or two.
fn strip_ui_controls(target: &mut Element) {
    target.remove_descendants(&|e| {
        e.is("div") && e.text_content().trim().chars().count() <= UI_CONTROL_MAX_CHARS
    });
}

fn split_lines(children: &[Node]) -> Vec<Vec<Node>> {
    let mut lines = Vec::new();
    let mut line = Vec::new();
    for node in children {
        match node {
            Node::Text(text) => {
                for (i, part) in text.split('\n').enumerate() {
                    if i > 0 {
                        lines.push(std::mem::take(&mut line));
                    }
                    if !part.is_empty() {
                        line.push(Node::text(part));
                    }
                }
            }
            Node::Element(el) if el.is("br") => lines.push(std::mem::take(&mut line)),
            other => line.push(other.clone()),
        }
    }
    lines.push(line);
    lines
}

fn line_block(target: &Element, lines: &[Vec<Node>], id: usize) -> Element {
    let is_pre = target.is("pre");
    let mut el = Element::new(if is_pre { "pre" } else { "div" });

    let class = match target.attr("class") {
        Some(c) if !c.trim().is_empty() => format!("{} {}", BLOCK_CLASS, c.trim()),
        _ => BLOCK_CLASS.to_string(),
    };
    el.set_attr("class", class);
    el.set_attr(BLOCK_ATTR, id.to_string());
    let mut style = String::from("margin: 0 0 10px 0; white-space: pre-wrap;");
    if is_pre {
        style.push_str(" font-family: inherit;");
    }
    el.set_attr("style", style);

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            el.children.push(Node::Element(Element::new("br")));
        }
        el.children.extend(line.iter().cloned());
    }
    el
}

fn mark(el: &mut Element, id: usize) {
    el.add_class(BLOCK_CLASS);
    el.set_attr(BLOCK_ATTR, id.to_string());
}
