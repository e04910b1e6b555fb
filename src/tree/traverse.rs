//! Traversal primitives over an addressed tree
//!
//! Everything here derives relationships from the current addresses and child
//! lists; nothing caches parent pointers, so results stay correct after a
//! rewrite as long as the tree has been readdressed.

use super::{NodeId, NodeTree, ROOT_ADDRESS};

/// Parent of an attached node, derived from its address
pub fn parent_of(tree: &NodeTree, id: NodeId) -> Option<NodeId> {
    let addr = tree.addr(id);
    if addr == ROOT_ADDRESS {
        return None;
    }
    let (parent_addr, _) = addr.rsplit_once('.')?;
    let parent = tree.find(parent_addr)?;
    tree.get(parent).children.contains(&id).then_some(parent)
}

/// Following sibling of a node, if any
pub fn next_sibling(tree: &NodeTree, id: NodeId) -> Option<NodeId> {
    let parent = parent_of(tree, id)?;
    let siblings = &tree.get(parent).children;
    let position = siblings.iter().position(|candidate| *candidate == id)?;
    siblings.get(position + 1).copied()
}

/// Document-order successor used by the step loop.
///
/// With `descend` the first child wins. Otherwise the next sibling is taken,
/// climbing through ancestors when a level is exhausted. Climbing out of a
/// `while` yields the `while` itself (re-entry) and climbing out of a `block`
/// yields nothing, leaving the frame stack to decide. `else` siblings inside
/// an `if` are only ever entered by the `if` itself and are skipped.
pub fn next_node(tree: &NodeTree, id: NodeId, descend: bool) -> Option<NodeId> {
    if descend {
        if let Some(first) = tree.get(id).children.first() {
            return Some(*first);
        }
    }

    let mut current = id;
    loop {
        let parent = parent_of(tree, current)?;
        let parent_node = tree.get(parent);
        let position = parent_node
            .children
            .iter()
            .position(|candidate| *candidate == current)?;
        let skip_else = parent_node.kind == "if";
        let following = parent_node.children[position + 1..]
            .iter()
            .copied()
            .find(|sibling| !(skip_else && tree.get(*sibling).kind == "else"));
        if let Some(sibling) = following {
            return Some(sibling);
        }
        match parent_node.kind.as_str() {
            "while" => return Some(parent),
            "block" => return None,
            _ => current = parent,
        }
    }
}

/// First node (document order from `from`) whose `id` attribute matches
pub fn search_for_node(tree: &NodeTree, from: NodeId, id_attr: &str) -> Option<NodeId> {
    tree.walk(from)
        .into_iter()
        .find(|candidate| tree.get(*candidate).attr("id") == Some(id_attr))
}

/// Closest ancestor whose type is one of `kinds`
pub fn nearest_ancestor_of_type(tree: &NodeTree, id: NodeId, kinds: &[&str]) -> Option<NodeId> {
    let mut current = parent_of(tree, id);
    while let Some(candidate) = current {
        if kinds.contains(&tree.get(candidate).kind.as_str()) {
            return Some(candidate);
        }
        current = parent_of(tree, candidate);
    }
    None
}

/// Whether `addr` is `container` or lies inside it
pub fn is_within(addr: &str, container: &str) -> bool {
    addr == container
        || (addr.len() > container.len()
            && addr.starts_with(container)
            && addr.as_bytes()[container.len()] == b'.')
}

/// Concatenated raw text of a subtree, without any markup re-encoding
pub fn inner_text(tree: &NodeTree, id: NodeId) -> String {
    let node = tree.get(id);
    if node.is_text() {
        return node.text.clone();
    }
    node.children
        .iter()
        .map(|child| inner_text(tree, *child))
        .collect()
}

/// Author-facing text of a subtree.
///
/// `<when cond>` children are included only when `include` approves their
/// condition. Formatting elements are re-encoded as markdown-style markup:
/// bold `**x**`, italic `*x*`, links `[x](href)`, images `![alt](src)` and
/// headings `# x`.
pub fn marshall_text(tree: &NodeTree, id: NodeId, include: &mut dyn FnMut(&str) -> bool) -> String {
    let node = tree.get(id);
    if node.is_text() {
        return node.text.clone();
    }
    let mut inner = String::new();
    for child in &node.children {
        let child_node = tree.get(*child);
        if child_node.kind == "when" {
            let condition = child_node.attr("cond").unwrap_or("false");
            if !include(condition) {
                continue;
            }
        }
        inner.push_str(&marshall_child(tree, *child, include));
    }
    inner
}

fn marshall_child(tree: &NodeTree, id: NodeId, include: &mut dyn FnMut(&str) -> bool) -> String {
    let node = tree.get(id);
    match node.kind.as_str() {
        "b" | "strong" => format!("**{}**", marshall_text(tree, id, include)),
        "i" | "em" => format!("*{}*", marshall_text(tree, id, include)),
        "a" => format!(
            "[{}]({})",
            marshall_text(tree, id, include),
            node.attr("href").unwrap_or("")
        ),
        "img" => format!(
            "![{}]({})",
            node.attr("alt").unwrap_or(""),
            node.attr("src").unwrap_or("")
        ),
        "br" => "\n".to_string(),
        kind if heading_level(kind).is_some() => {
            let level = heading_level(kind).unwrap_or(1);
            format!("{} {}", "#".repeat(level), marshall_text(tree, id, include))
        }
        _ => marshall_text(tree, id, include),
    }
}

/// Heading level for `h1`…`h6`
pub fn heading_level(kind: &str) -> Option<usize> {
    let digit = kind.strip_prefix('h')?;
    match digit.parse::<usize>() {
        Ok(level) if (1..=6).contains(&level) => Some(level),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_document;

    fn build(source: &str) -> NodeTree {
        let mut tree = NodeTree::new();
        let root = tree.root();
        for element in parse_document(source) {
            let id = tree.graft(&element);
            tree.append_child(root, id);
        }
        tree.readdress();
        tree
    }

    fn addr_of(tree: &NodeTree, id: Option<NodeId>) -> Option<String> {
        id.map(|id| tree.addr(id).to_string())
    }

    #[test]
    fn test_next_node_descends_then_climbs() {
        let tree = build("<div><p>a</p></div><p>b</p>");
        let para = tree.find("0.0.0").unwrap();
        assert_eq!(addr_of(&tree, next_node(&tree, tree.find("0.0").unwrap(), true)), Some("0.0.0".into()));
        assert_eq!(addr_of(&tree, next_node(&tree, para, false)), Some("0.1".into()));
        assert_eq!(next_node(&tree, tree.find("0.1").unwrap(), false), None);
    }

    #[test]
    fn test_while_reenters_and_block_stops() {
        let tree = build(r#"<while cond="true"><p>a</p></while><block id="b"><p>x</p></block><p>z</p>"#);
        let in_while = tree.find("0.0.0").unwrap();
        let in_block = tree.find("0.1.0").unwrap();
        assert_eq!(addr_of(&tree, next_node(&tree, in_while, false)), Some("0.0".into()));
        assert_eq!(next_node(&tree, in_block, false), None);
    }

    #[test]
    fn test_else_branch_is_skipped_from_then_branch() {
        let tree = build(r#"<if cond="x"><p>yes</p><else><p>no</p></else></if><p>after</p>"#);
        let then_para = tree.find("0.0.0").unwrap();
        assert_eq!(addr_of(&tree, next_node(&tree, then_para, false)), Some("0.1".into()));
    }

    #[test]
    fn test_parent_and_ancestor_lookup() {
        let tree = build(r#"<while cond="1"><scope><p>a</p></scope></while>"#);
        let para = tree.find("0.0.0.0").unwrap();
        assert_eq!(addr_of(&tree, parent_of(&tree, para)), Some("0.0.0".into()));
        assert_eq!(
            addr_of(&tree, nearest_ancestor_of_type(&tree, para, &["while"])),
            Some("0.0".into())
        );
        assert_eq!(parent_of(&tree, tree.root()), None);
    }

    #[test]
    fn test_search_finds_first_id() {
        let tree = build(r#"<div><p id="x">a</p></div><p id="x">b</p>"#);
        assert_eq!(
            addr_of(&tree, search_for_node(&tree, tree.root(), "x")),
            Some("0.0.0".into())
        );
    }

    #[test]
    fn test_prefix_containment() {
        assert!(is_within("0.1.2", "0.1"));
        assert!(is_within("0.1", "0.1"));
        assert!(!is_within("0.10", "0.1"));
        assert!(!is_within("0.2", "0.1"));
    }

    #[test]
    fn test_marshall_reencodes_formatting_and_honors_when() {
        let tree = build(
            r#"<p>Go <b>now</b>, <i>quietly</i> <a href="/x">here</a><when cond="no"> never</when><when cond="yes">!</when></p>"#,
        );
        let para = tree.find("0.0").unwrap();
        let text = marshall_text(&tree, para, &mut |cond| cond == "yes");
        assert_eq!(text, "Go **now**, *quietly* [here](/x)!");
    }
}
