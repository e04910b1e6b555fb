//! Story compiler
//!
//! Turns a set of documents into a single addressed [`NodeTree`] plus the
//! artifacts the engine needs at run time. The pipeline is:
//!
//! 1. order documents (`main` first) and split them into markup, data and
//!    script modules
//! 2. parse markup and graft every document forest under one root
//! 3. expand `<include>` nodes, then apply top-level `<macro>` rules
//! 4. assign addresses
//! 5. absorb data documents and interpolate metadata against itself
//! 6. optionally generate a cover image
//! 7. resolve pending voices by generation or from the preset catalog
//!
//! Recoverable problems are logged and skipped; only an empty input or an
//! unreadable file aborts.

pub mod artifacts;
pub mod voices;

pub use artifacts::{Artifacts, module_namespace, parse_payload, parse_typed_payload};
pub use voices::{VoiceMap, VoiceRequest, VoiceSpec};

use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::CompileConfig;
use crate::error::{CompileError, CompileResult};
use crate::eval::TagRules;
use crate::markup::parse_document;
use crate::provider::{MediaRequest, Provider};
use crate::rewrite::{apply_static_macros, expand_includes};
use crate::tree::{NodeId, NodeTree, inner_text};

/// How a document is treated by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Story markup
    Markup,
    /// JSON or YAML data
    Data,
    /// Script module
    Script,
}

/// One source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Logical path, used for ordering and module namespaces
    pub path: String,
    /// Raw contents
    pub source: String,
}

impl Document {
    /// Create an in-memory document
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Read a document from disk
    pub async fn load(path: impl AsRef<Path>) -> CompileResult<Self> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CompileError::Io {
                path: PathBuf::from(path),
                source,
            })?;
        Ok(Self::new(path.to_string_lossy(), source))
    }

    /// File name without directory or extension
    pub fn stem(&self) -> &str {
        let name = self.path.rsplit(['/', '\\']).next().unwrap_or(&self.path);
        name.split('.').next().unwrap_or(name)
    }

    /// Classification by extension
    pub fn kind(&self) -> DocumentKind {
        let lower = self.path.to_ascii_lowercase();
        if lower.ends_with(".json") || lower.ends_with(".yaml") || lower.ends_with(".yml") {
            DocumentKind::Data
        } else if lower.ends_with(".script") {
            DocumentKind::Script
        } else {
            DocumentKind::Markup
        }
    }
}

/// A compiled story: the addressed tree and its artifacts
#[derive(Debug, Clone, Default, Serialize)]
pub struct Story {
    /// Addressed node tree
    pub tree: NodeTree,
    /// Word to spoken form, applied before speech synthesis
    pub pronunciations: BTreeMap<String, String>,
    /// Resolved voices by name
    pub voices: VoiceMap,
    /// Story metadata
    pub meta: Map<String, Value>,
    /// Script modules by dotted namespace
    pub modules: BTreeMap<String, String>,
    /// Derived tag rules
    pub tag_rules: TagRules,
}

impl Story {
    /// Build a story from a single markup source with default settings and
    /// no provider access.
    pub fn from_markup(source: &str) -> Self {
        let mut tree = NodeTree::new();
        let root = tree.root();
        for element in parse_document(source) {
            let id = tree.graft(&element);
            tree.append_child(root, id);
        }
        expand_includes(&mut tree);
        apply_static_macros(&mut tree);
        tree.readdress();
        Self {
            tree,
            ..Self::default()
        }
    }

    /// First node of a type, in document order
    pub fn first_of_kind(&self, kind: &str) -> Option<NodeId> {
        self.tree
            .walk(self.tree.root())
            .into_iter()
            .find(|id| self.tree.get(*id).kind == kind)
    }

    /// Story title from metadata
    pub fn title(&self) -> Option<&str> {
        self.meta.get("title").and_then(Value::as_str)
    }

    /// Addressed outline plus artifacts, as printed by tooling
    pub fn summary(&self) -> Value {
        json!({
            "tree": self.tree.outline(self.tree.root()),
            "meta": self.meta,
            "pronunciations": self.pronunciations,
            "voices": self.voices,
            "modules": self.modules.keys().collect::<Vec<_>>(),
            "tags": self.tag_rules,
        })
    }
}

/// Compile documents into a story
pub async fn compile(
    documents: &[Document],
    config: &CompileConfig,
    provider: &dyn Provider,
) -> CompileResult<Story> {
    if documents.is_empty() {
        return Err(CompileError::Empty);
    }

    let mut ordered: Vec<&Document> = documents.iter().collect();
    // stable: "main" first, everything else keeps the caller's order
    ordered.sort_by_key(|doc| doc.stem() != "main");

    let mut tree = NodeTree::new();
    let root = tree.root();
    let mut artifacts = Artifacts::default();
    let mut modules = BTreeMap::new();

    for doc in ordered {
        match doc.kind() {
            DocumentKind::Markup => {
                let forest = parse_document(&doc.source);
                if forest.is_empty() {
                    warn!("document {} produced no nodes", doc.path);
                }
                for element in forest {
                    let id = tree.graft(&element);
                    tree.append_child(root, id);
                }
            }
            DocumentKind::Data => match parse_payload(&doc.source) {
                Some(value) => artifacts.absorb(value),
                None => warn!("data document {} could not be parsed; skipped", doc.path),
            },
            DocumentKind::Script => {
                modules.insert(module_namespace(&doc.path), doc.source.clone());
            }
        }
    }

    let includes = expand_includes(&mut tree);
    let macros = apply_static_macros(&mut tree);
    tree.readdress();
    info!(
        "compiled {} document(s): {} nodes, {} include(s), {} macro(s)",
        documents.len(),
        tree.len(),
        includes,
        macros
    );

    let mut meta = artifacts.meta;
    if !meta.contains_key("title") {
        if let Some(title) = first_heading(&tree) {
            meta.insert("title".into(), Value::String(title));
        }
    }
    artifacts::interpolate_metadata(&mut meta);

    if config.generate_thumbnail {
        generate_thumbnail(&mut meta, config, provider).await;
    }

    let mut voices = artifacts.voices;
    if !artifacts.pending.is_empty() {
        let resolved = if config.generate_voices {
            voices::generate_voices(&artifacts.pending, provider).await
        } else {
            voices::assign_presets(&artifacts.pending, &config.voice_presets)
        };
        info!(
            "resolved {} of {} pending voice(s)",
            resolved.len(),
            artifacts.pending.len()
        );
        for (name, spec) in resolved {
            voices.entry(name).or_insert(spec);
        }
    }

    Ok(Story {
        tree,
        pronunciations: artifacts.pronunciations,
        voices,
        meta,
        modules,
        tag_rules: TagRules::compile(artifacts.tags),
    })
}

fn first_heading(tree: &NodeTree) -> Option<String> {
    tree.walk(tree.root())
        .into_iter()
        .find(|id| tree.get(*id).kind == "h1")
        .map(|id| inner_text(tree, id).trim().to_string())
        .filter(|title| !title.is_empty())
}

async fn generate_thumbnail(meta: &mut Map<String, Value>, config: &CompileConfig, provider: &dyn Provider) {
    if meta.contains_key("thumbnail") || meta.contains_key("image") {
        return;
    }
    let text = |key: &str| meta.get(key).and_then(Value::as_str).unwrap_or("").trim().to_string();
    let (title, description) = (text("title"), text("description"));
    if title.is_empty() && description.is_empty() {
        return;
    }
    let request = MediaRequest {
        prompt: format!("Cover art for the story \"{}\". {}", title, description)
            .trim()
            .to_string(),
        duration_ms: None,
        models: config.models.clone(),
    };
    match provider.generate_image(&request).await {
        Ok(url) => {
            info!("generated cover image");
            meta.insert("thumbnail".into(), Value::String(url));
        }
        Err(failure) => warn!("cover image generation failed: {}", failure),
    }
}
