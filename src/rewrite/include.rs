//! `<include id="…">` expansion
//!
//! An include is replaced in place by deep copies of the target's children.
//! Includes inside the copies are expanded recursively; the ids currently
//! being expanded are tracked so a self-referential chain is cut with a
//! warning instead of recursing forever.

use crate::tree::{NodeId, NodeTree};

/// Expand every include reachable from the root. Returns the number expanded.
pub fn expand_includes(tree: &mut NodeTree) -> usize {
    let root = tree.root();
    let mut expanding = Vec::new();
    let mut count = 0;
    expand_within(tree, root, &mut expanding, &mut count);
    count
}

/// Expand a single include node under `parent`, returning the nodes that now
/// occupy its position (empty when the target is missing or cyclic).
pub fn expand_include(tree: &mut NodeTree, parent: NodeId, include: NodeId) -> Vec<NodeId> {
    let mut expanding = Vec::new();
    let mut count = 0;
    expand_one(tree, parent, include, &mut expanding, &mut count)
}

fn expand_within(tree: &mut NodeTree, id: NodeId, expanding: &mut Vec<String>, count: &mut usize) {
    let children = tree.get(id).children.clone();
    for child in children {
        if tree.get(child).kind == "include" {
            expand_one(tree, id, child, expanding, count);
        } else {
            expand_within(tree, child, expanding, count);
        }
    }
}

fn expand_one(
    tree: &mut NodeTree,
    parent: NodeId,
    include: NodeId,
    expanding: &mut Vec<String>,
    count: &mut usize,
) -> Vec<NodeId> {
    let Some(target_id) = tree.get(include).attr("id").map(str::to_string) else {
        tracing::warn!("include without an id removed");
        tree.splice(parent, include, Vec::new());
        return Vec::new();
    };
    if expanding.contains(&target_id) {
        tracing::warn!("include cycle through '{}' aborted", target_id);
        tree.splice(parent, include, Vec::new());
        return Vec::new();
    }
    let Some(target) = find_target(tree, &target_id) else {
        tracing::warn!("include target '{}' not found", target_id);
        tree.splice(parent, include, Vec::new());
        return Vec::new();
    };

    let template = tree.get(target).children.clone();
    let copies: Vec<NodeId> = template.iter().map(|child| tree.deep_clone(*child)).collect();
    tree.splice(parent, include, copies.clone());
    *count += 1;

    expanding.push(target_id);
    let mut placed = Vec::new();
    for copy in copies {
        if tree.get(copy).kind == "include" {
            placed.extend(expand_one(tree, parent, copy, expanding, count));
        } else {
            expand_within(tree, copy, expanding, count);
            placed.push(copy);
        }
    }
    expanding.pop();
    placed
}

fn find_target(tree: &NodeTree, id: &str) -> Option<NodeId> {
    tree.walk(tree.root())
        .into_iter()
        .find(|candidate| {
            let node = tree.get(*candidate);
            node.kind != "include" && node.attr("id") == Some(id)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_document;
    use crate::tree::inner_text;

    fn build(source: &str) -> NodeTree {
        let mut tree = NodeTree::new();
        let root = tree.root();
        for element in parse_document(source) {
            let id = tree.graft(&element);
            tree.append_child(root, id);
        }
        tree
    }

    fn texts(tree: &NodeTree) -> Vec<String> {
        tree.get(tree.root())
            .children
            .iter()
            .map(|id| inner_text(tree, *id))
            .collect()
    }

    #[test]
    fn test_include_copies_target_children() {
        let mut tree = build(r#"<block id="greet"><p>Hello</p><p>there</p></block><include id="greet"/><p>end</p>"#);
        assert_eq!(expand_includes(&mut tree), 1);
        tree.readdress();
        assert_eq!(texts(&tree), vec!["Hellothere", "Hello", "there", "end"]);
    }

    #[test]
    fn test_nested_includes_resolve() {
        let mut tree = build(
            r#"<block id="a"><p>A</p><include id="b"/></block><block id="b"><p>B</p></block><include id="a"/>"#,
        );
        expand_includes(&mut tree);
        tree.readdress();
        let tail: Vec<String> = texts(&tree)[2..].to_vec();
        assert_eq!(tail, vec!["A", "B"]);
    }

    #[test]
    fn test_cycles_are_cut() {
        let mut tree = build(r#"<block id="loop"><p>x</p><include id="loop"/></block><include id="loop"/>"#);
        expand_includes(&mut tree);
        tree.readdress();
        // the self-include inside the block expands once before the cycle is detected
        assert_eq!(texts(&tree), vec!["xx", "x", "x"]);
        assert!(tree.walk(tree.root()).iter().all(|id| tree.get(*id).kind != "include"));
    }

    #[test]
    fn test_missing_target_is_dropped() {
        let mut tree = build(r#"<p>a</p><include id="ghost"/><p>b</p>"#);
        assert_eq!(expand_includes(&mut tree), 0);
        tree.readdress();
        assert_eq!(texts(&tree), vec!["a", "b"]);
    }
}
