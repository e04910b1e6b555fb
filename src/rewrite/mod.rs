//! Tree rewriting: macros and includes
//!
//! A [`Macro`] pairs selectors with an ordered operation list. Applying a
//! macro walks the whole tree bottom-up: children are rewritten first, then
//! the node itself is tested against the selectors (first match wins) and the
//! operations run in order. `replace` is terminal.
//!
//! Rewrites never touch addresses; callers readdress afterwards.

pub mod include;

pub use include::{expand_include, expand_includes};

use crate::tree::{NodeId, NodeTree};

/// Attribute test inside a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrPredicate {
    /// `[name]`
    Exists(String),
    /// `[name=value]`
    Equals(String, String),
}

/// One comma-separated selector (`npc[mood=angry]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Tag to match; `None` matches any element
    pub tag: Option<String>,
    /// Attribute predicates, all of which must hold
    pub predicates: Vec<AttrPredicate>,
}

impl Selector {
    /// Parse a single selector
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }
        let tag_end = source.find('[').unwrap_or(source.len());
        let tag = source[..tag_end].trim().to_ascii_lowercase();
        let mut predicates = Vec::new();
        let mut rest = &source[tag_end..];
        while let Some(open) = rest.find('[') {
            let close = rest[open..].find(']')? + open;
            let body = &rest[open + 1..close];
            let predicate = match body.split_once('=') {
                Some((name, value)) => AttrPredicate::Equals(
                    name.trim().to_string(),
                    value.trim().trim_matches(|ch| ch == '"' || ch == '\'').to_string(),
                ),
                None => AttrPredicate::Exists(body.trim().to_string()),
            };
            predicates.push(predicate);
            rest = &rest[close + 1..];
        }
        Some(Self {
            tag: (!tag.is_empty() && tag != "*").then_some(tag),
            predicates,
        })
    }

    /// Whether a node satisfies this selector
    pub fn matches(&self, tree: &NodeTree, id: NodeId, ignore_case: bool) -> bool {
        let node = tree.get(id);
        if node.is_text() {
            return false;
        }
        if self.tag.as_deref().is_some_and(|tag| tag != node.kind) {
            return false;
        }
        self.predicates.iter().all(|predicate| match predicate {
            AttrPredicate::Exists(name) => node.attrs.contains(name),
            AttrPredicate::Equals(name, expected) => node.attr(name).is_some_and(|actual| {
                if ignore_case {
                    actual.eq_ignore_ascii_case(expected)
                } else {
                    actual == expected
                }
            }),
        })
    }
}

/// A single rewrite operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroOp {
    /// Change the element's tag
    RenameTag(String),
    /// Rename an attribute
    RenameAttr {
        /// Existing name
        from: String,
        /// New name
        to: String,
    },
    /// Set an attribute
    SetAttr {
        /// Attribute name
        name: String,
        /// Attribute value
        value: String,
    },
    /// Remove an attribute
    RemoveAttr(String),
    /// Append copies of the template nodes as children
    Append(Vec<NodeId>),
    /// Prepend copies of the template nodes as children
    Prepend(Vec<NodeId>),
    /// Replace the element with copies of the template nodes (terminal)
    Replace(Vec<NodeId>),
}

/// Selector list plus operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    /// Selectors, OR-ed together
    pub selectors: Vec<Selector>,
    /// Operations applied in order to each match
    pub ops: Vec<MacroOp>,
    /// Case-insensitive attribute value comparison
    pub ignore_case: bool,
}

impl Macro {
    /// Read a macro definition from a `<macro>` node.
    ///
    /// Template content for append/prepend/replace stays in the arena and is
    /// cloned on every application, so the macro node may be detached.
    pub fn from_node(tree: &NodeTree, id: NodeId) -> Option<Self> {
        let node = tree.get(id);
        let Some(pattern) = node.attr("match").or_else(|| node.attr("select")) else {
            tracing::warn!("macro without a match attribute ignored");
            return None;
        };
        let selectors: Vec<Selector> = pattern.split(',').filter_map(Selector::parse).collect();
        if selectors.is_empty() {
            tracing::warn!("macro with empty selector '{}' ignored", pattern);
            return None;
        }

        let mut ops = Vec::new();
        for child in &node.children {
            let op_node = tree.get(*child);
            if op_node.is_text() {
                continue;
            }
            let op = match op_node.kind.as_str() {
                "rename" => match (op_node.attr("attr"), op_node.attr("to")) {
                    (Some(from), Some(to)) => Some(MacroOp::RenameAttr {
                        from: from.to_string(),
                        to: to.to_string(),
                    }),
                    (None, Some(to)) => Some(MacroOp::RenameTag(to.to_ascii_lowercase())),
                    _ => None,
                },
                "set" => match (op_node.attr("attr"), op_node.attr("value")) {
                    (Some(name), value) => Some(MacroOp::SetAttr {
                        name: name.to_string(),
                        value: value.unwrap_or_default().to_string(),
                    }),
                    _ => None,
                },
                "remove" => op_node.attr("attr").map(|name| MacroOp::RemoveAttr(name.to_string())),
                "append" => Some(MacroOp::Append(op_node.children.clone())),
                "prepend" => Some(MacroOp::Prepend(op_node.children.clone())),
                "replace" => Some(MacroOp::Replace(op_node.children.clone())),
                _ => None,
            };
            match op {
                Some(op) => ops.push(op),
                None => tracing::warn!("skipping malformed macro operation <{}>", op_node.kind),
            }
        }

        Some(Self {
            selectors,
            ops,
            ignore_case: node.attrs.contains("ignore-case") || node.attrs.contains("ignorecase"),
        })
    }

    /// Whether any selector matches a node
    pub fn matches(&self, tree: &NodeTree, id: NodeId) -> bool {
        self.selectors
            .iter()
            .any(|selector| selector.matches(tree, id, self.ignore_case))
    }

    /// Apply to the whole tree below the root, returning the number of matches
    pub fn apply(&self, tree: &mut NodeTree) -> usize {
        let root = tree.root();
        let mut matched = 0;
        self.apply_children(tree, root, &mut matched);
        matched
    }

    fn apply_children(&self, tree: &mut NodeTree, parent: NodeId, matched: &mut usize) {
        let children = tree.get(parent).children.clone();
        for child in children {
            self.apply_children(tree, child, matched);
            if self.matches(tree, child) {
                *matched += 1;
                self.rewrite(tree, parent, child);
            }
        }
    }

    fn rewrite(&self, tree: &mut NodeTree, parent: NodeId, id: NodeId) {
        for op in &self.ops {
            match op {
                MacroOp::RenameTag(kind) => tree.get_mut(id).kind = kind.clone(),
                MacroOp::RenameAttr { from, to } => tree.get_mut(id).attrs.rename(from, to),
                MacroOp::SetAttr { name, value } => tree.get_mut(id).attrs.set(name.clone(), value.clone()),
                MacroOp::RemoveAttr(name) => {
                    tree.get_mut(id).attrs.remove(name);
                }
                MacroOp::Append(template) => {
                    let copies: Vec<NodeId> = template.iter().map(|node| tree.deep_clone(*node)).collect();
                    tree.get_mut(id).children.extend(copies);
                }
                MacroOp::Prepend(template) => {
                    let copies: Vec<NodeId> = template.iter().map(|node| tree.deep_clone(*node)).collect();
                    let node = tree.get_mut(id);
                    let existing = std::mem::take(&mut node.children);
                    node.children = copies.into_iter().chain(existing).collect();
                }
                MacroOp::Replace(template) => {
                    let copies: Vec<NodeId> = template.iter().map(|node| tree.deep_clone(*node)).collect();
                    tree.splice(parent, id, copies);
                    return;
                }
            }
        }
    }
}

/// Pull top-level `<macro>` nodes out of the root and apply them in order.
///
/// Returns the number of macros applied. Nested macros stay in place.
pub fn apply_static_macros(tree: &mut NodeTree) -> usize {
    let root = tree.root();
    let top_level: Vec<NodeId> = tree
        .get(root)
        .children
        .iter()
        .copied()
        .filter(|child| tree.get(*child).kind == "macro")
        .collect();
    // every definition leaves the tree before any runs, so none rewrites another
    for id in &top_level {
        tree.detach(root, *id);
    }
    let definitions: Vec<Macro> = top_level.iter().filter_map(|id| Macro::from_node(tree, *id)).collect();
    for definition in &definitions {
        let matched = definition.apply(tree);
        tracing::debug!("static macro matched {} node(s)", matched);
    }
    definitions.len()
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
        tree
    }

    fn kinds(tree: &NodeTree) -> Vec<String> {
        tree.get(tree.root())
            .children
            .iter()
            .map(|id| tree.get(*id).kind.clone())
            .collect()
    }

    #[test]
    fn test_selectors_parse_tags_and_predicates() {
        let selector = Selector::parse(r#"npc[mood="angry"][voice]"#).unwrap();
        assert_eq!(selector.tag.as_deref(), Some("npc"));
        assert_eq!(
            selector.predicates,
            vec![
                AttrPredicate::Equals("mood".into(), "angry".into()),
                AttrPredicate::Exists("voice".into()),
            ]
        );
        assert_eq!(Selector::parse("[id]").unwrap().tag, None);
    }

    #[test]
    fn test_static_macro_renames_and_sets() {
        let mut tree = build(
            r#"<macro match="guard"><rename to="p"/><set attr="voice" value="watchman"/></macro><guard>Halt.</guard>"#,
        );
        assert_eq!(apply_static_macros(&mut tree), 1);
        tree.readdress();
        assert_eq!(kinds(&tree), vec!["p"]);
        let para = tree.find("0.0").unwrap();
        assert_eq!(tree.get(para).attr("voice"), Some("watchman"));
        assert!(tree.walk(tree.root()).iter().all(|id| tree.get(*id).kind != "macro"));
    }

    #[test]
    fn test_pipeline_sees_earlier_renames() {
        let mut tree = build(
            r#"<macro match="npc"><rename to="speaker"/></macro><macro match="speaker"><set attr="seen" value="1"/></macro><npc>Hi</npc>"#,
        );
        apply_static_macros(&mut tree);
        tree.readdress();
        let node = tree.find("0.0").unwrap();
        assert_eq!(tree.get(node).kind, "speaker");
        assert_eq!(tree.get(node).attr("seen"), Some("1"));
    }

    #[test]
    fn test_macros_do_not_rewrite_later_definitions() {
        let mut tree = build(
            r#"<macro match="set"><rename to="remove"/></macro><macro match="npc"><set attr="voice" value="x"/></macro><macro match="p"><set attr="seen" value="1"/></macro><macro match="aside"><append><p>note</p></append></macro><npc>Hi</npc><aside>Psst</aside>"#,
        );
        assert_eq!(apply_static_macros(&mut tree), 4);
        tree.readdress();
        let npc = tree.find("0.0").unwrap();
        assert_eq!(tree.get(npc).attr("voice"), Some("x"));
        let note = tree.find("0.1.1").unwrap();
        assert_eq!(tree.get(note).kind, "p");
        assert_eq!(tree.get(note).attr("seen"), None);
    }

    #[test]
    fn test_case_insensitive_values_and_attribute_ops() {
        let mut tree = build(
            r#"<macro match="npc[mood=ANGRY]" ignore-case><rename attr="who" to="from"/><remove attr="mood"/></macro><npc who="Bo" mood="angry">Grr</npc><npc mood="calm">Hm</npc>"#,
        );
        apply_static_macros(&mut tree);
        tree.readdress();
        let angry = tree.get(tree.find("0.0").unwrap());
        assert_eq!(angry.attr("from"), Some("Bo"));
        assert!(angry.attr("mood").is_none());
        assert_eq!(tree.get(tree.find("0.1").unwrap()).attr("mood"), Some("calm"));
    }

    #[test]
    fn test_replace_is_terminal_and_append_clones() {
        let mut tree = build(
            r#"<macro match="stub"><replace><p>One</p><p>Two</p></replace><set attr="x" value="y"/></macro><macro match="div"><append><p>tail</p></append></macro><stub/><div><p>body</p></div>"#,
        );
        apply_static_macros(&mut tree);
        tree.readdress();
        assert_eq!(kinds(&tree), vec!["p", "p", "div"]);
        assert!(tree.get(tree.find("0.0").unwrap()).attr("x").is_none());
        let div = tree.find("0.2").unwrap();
        assert_eq!(tree.get(div).children.len(), 2);
    }

    #[test]
    fn test_children_are_rewritten_before_parents() {
        let mut tree = build(
            r#"<macro match="box"><rename to="div"/></macro><box><box>inner</box></box>"#,
        );
        let root = tree.root();
        let id = tree.get(root).children[0];
        tree.detach(root, id);
        let definition = Macro::from_node(&tree, id).unwrap();
        assert_eq!(definition.apply(&mut tree), 2);
        tree.readdress();
        assert_eq!(tree.get(tree.find("0.0.0").unwrap()).kind, "div");
    }
}
