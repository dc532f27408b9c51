//! HTML distillation - reduces fetched markup to a minimal form for the
//! answer generator.
//!
//! Four ordered passes over the parsed tree: attribute allow-listing,
//! noise-subtree elision, whitespace/emptiness normalization, and pruning of
//! attribute-less void elements. Parsing is permissive (html5ever recovers
//! from broken markup), so both entry points accept arbitrary input.

use ego_tree::{NodeId, Tree};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use tendril::StrTendril;

/// Attributes that carry extractable signal; everything else is stripped.
const ALLOWED_ATTRS: [&str; 13] = [
    "src",
    "href",
    "alt",
    "title",
    "role",
    "aria-label",
    "aria-hidden",
    "aria-atomic",
    "name",
    "type",
    "value",
    "content",
    "property",
];

/// Tags whose entire subtree is noise.
const NOISE_TAGS: [&str; 6] = ["script", "style", "link", "noscript", "template", "iframe"];

/// Void tags: childless by definition, exempt from the empty-element rule.
const VOID_TAGS: [&str; 11] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "wbr", "meta",
];

/// Distill raw markup: strip noise attributes, elide noise subtrees, trim
/// whitespace, drop empty elements, and render the result back to HTML.
///
/// Structurally idempotent: a second `clean` over its own output makes no
/// further removals. Whitespace that was only separated by removed nodes may
/// still collapse on a rerun.
pub fn clean(html: &str) -> String {
    let mut doc = Html::parse_document(html);
    filter_attributes(&mut doc.tree);
    elide_noise(&mut doc.tree);
    normalize(&mut doc.tree);
    prune_bare_voids(&mut doc.tree);
    render(&doc)
}

/// Extract all text content, one text node per line, in document order.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();
    for node in doc.tree.root().descendants() {
        if let Node::Text(text) = node.value() {
            out.push_str(text.text.trim());
            out.push('\n');
        }
    }
    out.trim().to_string()
}

fn tag_in(set: &[&str], name: &str) -> bool {
    set.iter().any(|t| *t == name)
}

/// Pass 1: keep only allow-listed attributes, preserving their order.
fn filter_attributes(tree: &mut Tree<Node>) {
    let ids: Vec<NodeId> = tree.root().descendants().map(|n| n.id()).collect();
    for id in ids {
        if let Some(mut node) = tree.get_mut(id) {
            if let Node::Element(el) = node.value() {
                el.attrs.retain(|key, _| tag_in(&ALLOWED_ATTRS, &key.local));
            }
        }
    }
}

/// Pass 2: detach noise subtrees. An `svg` keeps its element but loses all
/// children, so it stays behind as a layout marker. Neither elided nor svg
/// subtrees are recursed into.
fn elide_noise(tree: &mut Tree<Node>) {
    let root = tree.root().id();
    elide_children(tree, root);
}

fn elide_children(tree: &mut Tree<Node>, id: NodeId) {
    let children: Vec<NodeId> = match tree.get(id) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };

    for child in children {
        let tag = tree
            .get(child)
            .and_then(|n| n.value().as_element().map(|el| el.name().to_string()));

        match tag.as_deref() {
            Some("svg") => {
                let grandchildren: Vec<NodeId> = tree
                    .get(child)
                    .map(|n| n.children().map(|c| c.id()).collect())
                    .unwrap_or_default();
                for grandchild in grandchildren {
                    if let Some(mut node) = tree.get_mut(grandchild) {
                        node.detach();
                    }
                }
            }
            Some(tag) if tag_in(&NOISE_TAGS, tag) => {
                if let Some(mut node) = tree.get_mut(child) {
                    node.detach();
                }
            }
            _ => elide_children(tree, child),
        }
    }
}

/// Pass 3 (post-order): trim every text node, drop text nodes that trim to
/// nothing, and drop elements left with no children. Void tags and `svg`
/// are exempt from the empty-element rule.
fn normalize(tree: &mut Tree<Node>) {
    let root = tree.root().id();
    normalize_children(tree, root);
}

fn normalize_children(tree: &mut Tree<Node>, id: NodeId) {
    let children: Vec<NodeId> = match tree.get(id) {
        Some(node) => node.children().map(|c| c.id()).collect(),
        None => return,
    };

    for child in children {
        normalize_children(tree, child);

        let remove = match tree.get(child) {
            Some(node) => match node.value() {
                Node::Text(text) => text.text.trim().is_empty(),
                Node::Element(el) => {
                    node.children().next().is_none()
                        && !tag_in(&VOID_TAGS, el.name())
                        && el.name() != "svg"
                }
                _ => false,
            },
            None => false,
        };

        if let Some(mut node) = tree.get_mut(child) {
            if remove {
                node.detach();
            } else if let Node::Text(text) = node.value() {
                let trimmed = text.text.trim();
                if trimmed.len() != text.text.len() {
                    let replacement = StrTendril::from(trimmed);
                    text.text = replacement;
                }
            }
        }
    }
}

/// Pass 4: a void element with no surviving attributes carries no signal.
fn prune_bare_voids(tree: &mut Tree<Node>) {
    let ids: Vec<NodeId> = tree.root().descendants().map(|n| n.id()).collect();
    for id in ids {
        let bare_void = tree
            .get(id)
            .and_then(|n| n.value().as_element().map(|el| {
                tag_in(&VOID_TAGS, el.name()) && el.attrs.is_empty()
            }))
            .unwrap_or(false);
        if bare_void {
            if let Some(mut node) = tree.get_mut(id) {
                node.detach();
            }
        }
    }
}

fn render(doc: &Html) -> String {
    doc.tree
        .root()
        .children()
        .filter_map(ElementRef::wrap)
        .map(|el| el.html())
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_disallowed_attributes_keeps_order() {
        let cleaned = clean(r#"<p class="big" href="/a" onclick="x()" title="t">hi</p>"#);
        assert!(cleaned.contains(r#"href="/a""#));
        assert!(cleaned.contains(r#"title="t""#));
        assert!(!cleaned.contains("class"));
        assert!(!cleaned.contains("onclick"));
        // surviving attributes keep their original relative order
        let href_at = cleaned.find("href").unwrap();
        let title_at = cleaned.find("title").unwrap();
        assert!(href_at < title_at);
    }

    #[test]
    fn removes_noise_subtrees() {
        let cleaned = clean(
            "<div><script>var x = 1;</script><style>p{}</style>\
             <iframe src=\"x\"></iframe><p>keep</p></div>",
        );
        assert!(cleaned.contains("<p>keep</p>"));
        assert!(!cleaned.contains("script"));
        assert!(!cleaned.contains("style"));
        assert!(!cleaned.contains("iframe"));
    }

    #[test]
    fn svg_survives_as_empty_leaf() {
        let cleaned = clean(r#"<div><svg viewBox="0 0 1 1"><path d="M0 0"/></svg><p>t</p></div>"#);
        assert!(cleaned.contains("<svg></svg>"));
        assert!(!cleaned.contains("path"));
    }

    #[test]
    fn empty_div_removed_void_with_attrs_kept() {
        let cleaned = clean(r#"<body><div></div><img src="/a.png"><p>x</p></body>"#);
        assert!(!cleaned.contains("<div"));
        assert!(cleaned.contains(r#"<img src="/a.png">"#));
    }

    #[test]
    fn attribute_less_voids_pruned() {
        let cleaned = clean("<p>line<br>break<img></p>");
        assert!(!cleaned.contains("<br>"));
        assert!(!cleaned.contains("<img"));
        // a void that keeps an allow-listed attribute survives
        let kept = clean(r#"<p>a<br title="pause">b</p>"#);
        assert!(kept.contains("<br"));
    }

    #[test]
    fn whitespace_trimmed_and_blank_text_dropped() {
        let cleaned = clean("<div>  <p>  hello  </p>  </div>");
        assert!(cleaned.contains("<p>hello</p>"));
    }

    #[test]
    fn second_pass_makes_no_structural_change() {
        let page = r#"<html><head><title>T</title><script>var x=1;</script></head>
            <body data-junk="1" role="main">
              <div class="wrap"><p style="color:red">Hello <b>world</b></p>
                <img src="/a.png"><br></div>
              <svg viewBox="0 0 1 1"><path d="M0"/></svg>
            </body></html>"#;
        let once = clean(page);
        let twice = clean(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn extract_text_collects_in_document_order() {
        let text = extract_text("<div><h1> Title </h1><p>first</p><p>second</p></div>");
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines, vec!["Title", "first", "second"]);
    }

    #[test]
    fn extract_text_tolerates_broken_markup() {
        let text = extract_text("<p>unclosed <b>bold<div>and more");
        assert!(text.contains("unclosed"));
        assert!(text.contains("and more"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean(""), "");
        assert_eq!(extract_text(""), "");
    }
}
