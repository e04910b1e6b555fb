//! Action handler registry
//!
//! Handlers form a closed set. Each registry entry pairs the tag names it
//! serves with a syntax contract; dispatch takes the first entry whose tags
//! match and falls back to an inert default, so unknown tags never fail.

mod fields;
mod flow;
mod input;
mod llm;
mod media;
mod state;
mod text;

pub use fields::Field;

use serde_json::{Map, Value};

use super::ops::{NodeInfo, Operation, StoryEvent};
use super::scope::LayeredScope;
use super::session::{Frame, Session};
use crate::compiler::Story;
use crate::config::EngineConfig;
use crate::eval::{self, Prng, RenderContext, Scope};
use crate::provider::Provider;
use crate::tree::{NodeId, NodeTree, marshall_text};

/// Every handler the engine knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Spoken text
    Text,
    /// Player input
    Input,
    /// Variable assignment
    Var,
    /// Conditional
    If,
    /// Else branch, entered only through its `if`
    Else,
    /// Jump to a node id
    Jump,
    /// Embedded statements
    Script,
    /// Timed pause
    Sleep,
    /// Loop
    While,
    /// Leave the nearest loop
    Break,
    /// Restart the nearest loop
    Continue,
    /// Checkpointed container
    Section,
    /// Plain container
    Container,
    /// Block entered only via yield or jump
    Block,
    /// Call a block and come back
    Yield,
    /// Container with private variables
    Scope,
    /// Runtime rewrite rule
    Macro,
    /// Runtime include
    Include,
    /// Conditional inline text
    When,
    /// Structured data load
    Data,
    /// Forced checkpoint
    Checkpoint,
    /// First-turn preamble
    Intro,
    /// Reopened-session preamble
    Resume,
    /// Closing section
    Outro,
    /// End the story (outro still plays)
    End,
    /// End the story skipping the outro
    Exit,
    /// Free-form generation
    LlmText,
    /// Classification into tags
    LlmTag,
    /// Numeric scoring
    LlmScore,
    /// Moderation
    LlmModerate,
    /// Field extraction from text
    LlmParse,
    /// Structured generation
    LlmGenerate,
    /// In-character dialogue line
    LlmLine,
    /// Sound effect or audio clip
    Sound,
    /// Background music
    Music,
    /// Picture
    Image,
    /// Read a long text aloud
    Read,
    /// Developer log
    Log,
    /// Anything else; inert
    Default,
}

/// Attribute value type in a syntax contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// Template text
    Text,
    /// Number
    Number,
    /// Flag
    Boolean,
    /// Expression source
    Expression,
    /// Node id reference
    Reference,
}

/// One attribute of a syntax contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrSpec {
    /// Attribute name
    pub name: &'static str,
    /// Value type
    pub kind: AttrType,
    /// Whether the tag is unusable without it
    pub required: bool,
    /// Value used when absent
    pub default: Option<&'static str>,
}

const fn required(name: &'static str, kind: AttrType) -> AttrSpec {
    AttrSpec {
        name,
        kind,
        required: true,
        default: None,
    }
}

const fn optional(name: &'static str, kind: AttrType, default: Option<&'static str>) -> AttrSpec {
    AttrSpec {
        name,
        kind,
        required: false,
        default,
    }
}

/// Syntax contract of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Syntax {
    /// Whether the tag takes content
    pub block: bool,
    /// Declared attributes
    pub attrs: &'static [AttrSpec],
}

impl Syntax {
    /// First required attribute the node lacks
    pub fn missing(&self, tree: &NodeTree, id: NodeId) -> Option<&'static str> {
        let node = tree.get(id);
        self.attrs
            .iter()
            .find(|spec| spec.required && !node.attrs.contains(spec.name))
            .map(|spec| spec.name)
    }

    /// Declared default of an attribute
    pub fn default_of(&self, name: &str) -> Option<&'static str> {
        self.attrs
            .iter()
            .find(|spec| spec.name == name)
            .and_then(|spec| spec.default)
    }
}

/// Registry entry
#[derive(Debug, Clone, Copy)]
pub struct Entry {
    /// Handler
    pub kind: HandlerKind,
    /// Tag names served
    pub tags: &'static [&'static str],
    /// Syntax contract
    pub syntax: Syntax,
}

const fn entry(kind: HandlerKind, tags: &'static [&'static str], block: bool, attrs: &'static [AttrSpec]) -> Entry {
    Entry {
        kind,
        tags,
        syntax: Syntax { block, attrs },
    }
}

const SPEAKER: &[AttrSpec] = &[
    optional("from", AttrType::Text, Some("narrator")),
    optional("to", AttrType::Text, None),
    optional("obs", AttrType::Text, None),
    optional("voice", AttrType::Text, None),
];

const MEDIA: &[AttrSpec] = &[
    optional("src", AttrType::Text, None),
    optional("prompt", AttrType::Text, None),
    optional("key", AttrType::Text, None),
    optional("volume", AttrType::Number, None),
    optional("fade-in", AttrType::Number, None),
    optional("fade", AttrType::Number, None),
    optional("duration", AttrType::Number, None),
    optional("background", AttrType::Boolean, None),
];

const INPUT: &[AttrSpec] = &[
    optional("key", AttrType::Text, Some("input")),
    optional("scope", AttrType::Text, None),
    optional("type", AttrType::Text, None),
    optional("description", AttrType::Text, None),
    optional("pattern", AttrType::Text, None),
    optional("default", AttrType::Text, None),
];

const VAR: &[AttrSpec] = &[
    required("name", AttrType::Text),
    optional("value", AttrType::Text, None),
    optional("type", AttrType::Text, None),
    optional("scope", AttrType::Text, None),
];

const CONDITIONAL: &[AttrSpec] = &[required("cond", AttrType::Expression)];
const JUMP: &[AttrSpec] = &[required("to", AttrType::Reference)];
const SLEEP: &[AttrSpec] = &[optional("duration", AttrType::Number, Some("1000"))];
const BLOCK: &[AttrSpec] = &[optional("id", AttrType::Text, None)];
const YIELD: &[AttrSpec] = &[
    required("to", AttrType::Reference),
    optional("return", AttrType::Reference, None),
];
const MACRO: &[AttrSpec] = &[optional("match", AttrType::Text, None)];
const INCLUDE: &[AttrSpec] = &[required("id", AttrType::Reference)];
const DATA: &[AttrSpec] = &[
    required("key", AttrType::Text),
    optional("src", AttrType::Text, None),
    optional("type", AttrType::Text, None),
];
const LLM_TEXT: &[AttrSpec] = &[required("key", AttrType::Text), optional("system", AttrType::Text, None)];
const LLM_TAG: &[AttrSpec] = &[
    required("key", AttrType::Text),
    required("options", AttrType::Text),
    optional("text", AttrType::Text, None),
];
const LLM_SCORE: &[AttrSpec] = &[
    required("key", AttrType::Text),
    optional("min", AttrType::Number, Some("0")),
    optional("max", AttrType::Number, Some("10")),
    optional("text", AttrType::Text, None),
];
const LLM_SUBJECT: &[AttrSpec] = &[required("key", AttrType::Text), optional("text", AttrType::Text, None)];
const LLM_GENERATE: &[AttrSpec] = &[required("key", AttrType::Text)];
const LLM_LINE: &[AttrSpec] = &[
    required("key", AttrType::Text),
    required("speaker", AttrType::Text),
    optional("with", AttrType::Text, None),
    optional("limit", AttrType::Number, Some("12")),
];
const READ: &[AttrSpec] = &[
    optional("src", AttrType::Text, None),
    optional("from", AttrType::Text, Some("narrator")),
];
const NONE: &[AttrSpec] = &[];

/// Ordered dispatch table
pub static REGISTRY: &[Entry] = &[
    entry(
        HandlerKind::Text,
        &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote", "#text"],
        true,
        SPEAKER,
    ),
    entry(HandlerKind::Input, &["input"], false, INPUT),
    entry(HandlerKind::Var, &["var", "set"], true, VAR),
    entry(HandlerKind::If, &["if"], true, CONDITIONAL),
    entry(HandlerKind::Else, &["else"], true, NONE),
    entry(HandlerKind::Jump, &["jump", "goto"], false, JUMP),
    entry(HandlerKind::Script, &["script", "code"], true, NONE),
    entry(HandlerKind::Sleep, &["sleep", "pause"], false, SLEEP),
    entry(HandlerKind::While, &["while"], true, CONDITIONAL),
    entry(HandlerKind::Break, &["break"], false, NONE),
    entry(HandlerKind::Continue, &["continue"], false, NONE),
    entry(HandlerKind::Section, &["section", "sec"], true, NONE),
    entry(
        HandlerKind::Container,
        &["root", "div", "origin", "article", "main", "chapter", "body", "header", "footer", "ul", "ol"],
        true,
        NONE,
    ),
    entry(HandlerKind::Block, &["block"], true, BLOCK),
    entry(HandlerKind::Yield, &["yield"], false, YIELD),
    entry(HandlerKind::Scope, &["scope"], true, NONE),
    entry(HandlerKind::Macro, &["macro"], true, MACRO),
    entry(HandlerKind::Include, &["include"], false, INCLUDE),
    entry(HandlerKind::When, &["when"], true, NONE),
    entry(HandlerKind::Data, &["data"], true, DATA),
    entry(HandlerKind::Checkpoint, &["checkpoint"], false, NONE),
    entry(HandlerKind::Intro, &["intro"], true, NONE),
    entry(HandlerKind::Resume, &["resume"], true, NONE),
    entry(HandlerKind::Outro, &["outro"], true, NONE),
    entry(HandlerKind::End, &["end"], false, NONE),
    entry(HandlerKind::Exit, &["exit"], false, NONE),
    entry(HandlerKind::LlmText, &["llm:text"], true, LLM_TEXT),
    entry(HandlerKind::LlmTag, &["llm:tag"], true, LLM_TAG),
    entry(HandlerKind::LlmScore, &["llm:score"], true, LLM_SCORE),
    entry(HandlerKind::LlmModerate, &["llm:moderate"], true, LLM_SUBJECT),
    entry(HandlerKind::LlmParse, &["llm:parse"], true, LLM_SUBJECT),
    entry(HandlerKind::LlmGenerate, &["llm:generate"], true, LLM_GENERATE),
    entry(HandlerKind::LlmLine, &["llm:line"], true, LLM_LINE),
    entry(HandlerKind::Sound, &["sound", "audio"], true, MEDIA),
    entry(HandlerKind::Music, &["music"], true, MEDIA),
    entry(HandlerKind::Image, &["image"], true, MEDIA),
    entry(HandlerKind::Read, &["read"], true, READ),
    entry(HandlerKind::Log, &["log"], true, NONE),
];

static DEFAULT_ENTRY: Entry = entry(HandlerKind::Default, &[], true, NONE);

/// First entry serving a tag, or the inert default
pub fn lookup(tag: &str) -> &'static Entry {
    REGISTRY
        .iter()
        .find(|entry| entry.tags.contains(&tag))
        .unwrap_or(&DEFAULT_ENTRY)
}

/// Where execution goes after a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// First child, else the document successor
    Descend,
    /// Document successor without entering children
    Skip,
    /// A specific node
    Goto(NodeId),
    /// A specific node reached by an author jump
    Jump(NodeId),
    /// Resolved target; frames it escapes are dropped without returning
    Flow(Option<NodeId>),
    /// Stay on this node
    Stay,
    /// End the story
    End,
}

/// What a handler produced
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerOutput {
    /// Operations in emission order
    pub ops: Vec<Operation>,
    /// Next position
    pub next: Next,
    /// Frame to push before resolving `next`
    pub push: Option<Frame>,
}

impl HandlerOutput {
    /// No operations
    pub fn next(next: Next) -> Self {
        Self {
            ops: Vec::new(),
            next,
            push: None,
        }
    }

    /// Operations followed by a position
    pub fn with_ops(ops: Vec<Operation>, next: Next) -> Self {
        Self {
            ops,
            next,
            push: None,
        }
    }

    /// A story error; execution stays on the node
    pub fn error(reason: impl Into<String>) -> Self {
        Self::with_ops(
            vec![Operation::StoryError {
                reason: reason.into(),
            }],
            Next::Stay,
        )
    }

    /// Attach a frame to push
    pub fn pushing(mut self, frame: Frame) -> Self {
        self.push = Some(frame);
        self
    }
}

/// Everything a handler may touch during one step
pub struct StepContext<'a> {
    /// Story being played; runtime rewrites mutate its tree
    pub story: &'a mut Story,
    /// Session being advanced
    pub session: &'a mut Session,
    /// Generative services
    pub provider: &'a dyn Provider,
    /// Engine settings
    pub config: &'a EngineConfig,
    /// Random source for this call
    pub rng: &'a mut Prng,
    /// Node being executed
    pub node: NodeId,
    /// Step-level read-only variables
    pub extras: Map<String, Value>,
    /// Syntax contract of the dispatched handler
    pub syntax: &'static Syntax,
}

impl StepContext<'_> {
    /// Current node address
    pub fn addr(&self) -> String {
        self.story.tree.addr(self.node).to_string()
    }

    /// Raw attribute, falling back to the contract default
    pub fn attr(&self, name: &str) -> Option<String> {
        self.story
            .tree
            .get(self.node)
            .attr(name)
            .map(str::to_string)
            .or_else(|| self.syntax.default_of(name).map(str::to_string))
    }

    /// Attribute rendered through the synchronous template passes
    pub fn rendered_attr(&mut self, name: &str) -> Option<String> {
        let raw = self.attr(name)?;
        Some(self.render(&raw))
    }

    /// Run `f` against the layered scope
    pub fn with_scope<R>(&mut self, f: impl FnOnce(&mut LayeredScope<'_>, &mut Prng) -> R) -> R {
        let mut scope = LayeredScope::new(
            &mut self.session.stack,
            &mut self.session.state,
            &self.session.meta,
            &self.extras,
        );
        f(&mut scope, &mut *self.rng)
    }

    /// Template passes 1–3 with this node as the variation site
    pub fn render(&mut self, template: &str) -> String {
        let site = self.addr();
        let mut scope = LayeredScope::new(
            &mut self.session.stack,
            &mut self.session.state,
            &self.session.meta,
            &self.extras,
        );
        let mut ctx = RenderContext {
            scope: &mut scope,
            rng: &mut *self.rng,
            variations: &mut self.session.variations,
            site: &site,
        };
        eval::render(template, &mut ctx)
    }

    /// All four template passes
    pub async fn render_full(&mut self, template: &str) -> String {
        let rendered = self.render(template);
        let models = self.models();
        eval::expand_generated(&rendered, self.provider, &models).await
    }

    /// Author-facing text of the node, honoring `<when>` conditions
    pub fn marshall(&mut self) -> String {
        self.marshall_node(self.node)
    }

    /// Author-facing text of any node
    pub fn marshall_node(&mut self, node: NodeId) -> String {
        let mut scope = LayeredScope::new(
            &mut self.session.stack,
            &mut self.session.state,
            &self.session.meta,
            &self.extras,
        );
        let rng = &mut *self.rng;
        marshall_text(&self.story.tree, node, &mut |cond| {
            eval::condition(cond, &mut scope, &mut *rng)
        })
    }

    /// Evaluate a condition against the layered scope
    pub fn condition(&mut self, source: &str) -> bool {
        self.with_scope(|scope, rng| eval::condition(source, scope, rng))
    }

    /// Read a variable
    pub fn lookup(&mut self, key: &str) -> Value {
        self.with_scope(|scope, _| scope.lookup(key))
    }

    /// Write a variable to the nearest writable layer
    pub fn assign(&mut self, key: &str, value: Value) {
        self.with_scope(|scope, _| scope.assign(key, value));
    }

    /// Write a variable; `scope="global"` also writes session state directly
    pub fn store(&mut self, key: &str, value: Value) {
        if self.attr("scope").as_deref() == Some("global") {
            eval::path::set_in(&mut self.session.state, key, value.clone());
        }
        self.assign(key, value);
    }

    /// Model preference: the node's `models` attribute, else the engine's
    pub fn models(&self) -> Vec<String> {
        match self.attr("models").or_else(|| self.attr("model")) {
            Some(list) => list
                .split(',')
                .map(|model| model.trim().to_string())
                .filter(|model| !model.is_empty())
                .collect(),
            None => self.config.models.clone(),
        }
    }

    /// Checkpoint the session at this node
    pub fn checkpoint(&mut self) {
        self.session.address = Some(self.addr());
        self.session.checkpoint_here();
    }

    /// Build an event for this node, tagging the speaker
    pub fn event(&mut self, body: String, from: String, to: Vec<String>, obs: Vec<String>) -> StoryEvent {
        let tags = if self.story.tag_rules.is_empty() {
            Vec::new()
        } else {
            let mut extras = self.extras.clone();
            extras.insert("body".into(), Value::String(body.clone()));
            extras.insert("from".into(), Value::String(from.clone()));
            extras.insert("to".into(), Value::from(to.clone()));
            let scope = LayeredScope::new(
                &mut self.session.stack,
                &mut self.session.state,
                &self.session.meta,
                &extras,
            );
            self.story.tag_rules.matching(&from, &scope, &mut *self.rng)
        };
        StoryEvent {
            node: NodeInfo::of(&self.story.tree, self.node),
            body,
            from,
            to,
            obs,
            tags,
            time: self.session.time,
        }
    }
}

/// Attribute text as a value: JSON when it parses, else the string itself
pub(crate) fn infer_value(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Split a comma separated attribute
pub(crate) fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Frame addresses pinned to node ids across a runtime rewrite
pub(crate) struct FrameAnchors(Vec<(Option<NodeId>, Option<NodeId>)>);

impl FrameAnchors {
    pub(crate) fn capture(tree: &NodeTree, stack: &[Frame]) -> Self {
        Self(
            stack
                .iter()
                .map(|frame| {
                    (
                        tree.find(&frame.container),
                        frame.return_address.as_deref().and_then(|addr| tree.find(addr)),
                    )
                })
                .collect(),
        )
    }

    pub(crate) fn restore(self, tree: &NodeTree, stack: &mut [Frame]) {
        for (frame, (container, ret)) in stack.iter_mut().zip(self.0) {
            if let Some(id) = container.filter(|id| tree.is_attached(*id)) {
                frame.container = tree.addr(id).to_string();
            }
            if let Some(id) = ret.filter(|id| tree.is_attached(*id)) {
                frame.return_address = Some(tree.addr(id).to_string());
            }
        }
    }
}

/// Run a handler
pub async fn dispatch(kind: HandlerKind, ctx: &mut StepContext<'_>) -> HandlerOutput {
    match kind {
        HandlerKind::Text => text::speak(ctx).await,
        HandlerKind::Read => text::read(ctx).await,
        HandlerKind::Log => text::log(ctx),
        HandlerKind::Input => input::input(ctx).await,
        HandlerKind::Var => state::var(ctx),
        HandlerKind::Script => state::script(ctx),
        HandlerKind::Data => state::data(ctx).await,
        HandlerKind::Sleep => state::sleep(ctx),
        HandlerKind::Checkpoint => {
            ctx.checkpoint();
            HandlerOutput::next(Next::Skip)
        }
        HandlerKind::If => flow::branch(ctx),
        HandlerKind::While => flow::repeat(ctx),
        HandlerKind::Break => flow::loop_control(ctx, false),
        HandlerKind::Continue => flow::loop_control(ctx, true),
        HandlerKind::Jump => flow::jump(ctx),
        HandlerKind::Yield => flow::yield_to(ctx),
        HandlerKind::Block => flow::block(ctx),
        HandlerKind::Scope => flow::scope(ctx),
        HandlerKind::Section => {
            ctx.checkpoint();
            HandlerOutput::next(Next::Descend)
        }
        HandlerKind::Container => HandlerOutput::next(Next::Descend),
        HandlerKind::Intro | HandlerKind::Resume | HandlerKind::Outro => flow::preamble(ctx, kind),
        HandlerKind::End => HandlerOutput::next(Next::End),
        HandlerKind::Exit => {
            ctx.session.outroed = true;
            HandlerOutput::next(Next::End)
        }
        HandlerKind::Macro => flow::runtime_macro(ctx),
        HandlerKind::Include => flow::runtime_include(ctx),
        HandlerKind::LlmText => llm::text(ctx).await,
        HandlerKind::LlmTag => llm::tag(ctx).await,
        HandlerKind::LlmScore => llm::score(ctx).await,
        HandlerKind::LlmModerate => llm::moderate(ctx).await,
        HandlerKind::LlmParse => llm::parse(ctx).await,
        HandlerKind::LlmGenerate => llm::generate(ctx).await,
        HandlerKind::LlmLine => llm::line(ctx).await,
        HandlerKind::Sound | HandlerKind::Music | HandlerKind::Image => media::media(ctx, kind).await,
        HandlerKind::Else | HandlerKind::When | HandlerKind::Default => HandlerOutput::next(Next::Skip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_first_match_with_default() {
        assert_eq!(lookup("p").kind, HandlerKind::Text);
        assert_eq!(lookup("h3").kind, HandlerKind::Text);
        assert_eq!(lookup("goto").kind, HandlerKind::Jump);
        assert_eq!(lookup("llm:line").kind, HandlerKind::LlmLine);
        assert_eq!(lookup("marquee").kind, HandlerKind::Default);
    }

    #[test]
    fn test_contracts_report_missing_attributes() {
        let story = Story::from_markup(r#"<jump/><jump to="x"/>"#);
        let tree = &story.tree;
        let syntax = lookup("jump").syntax;
        assert_eq!(syntax.missing(tree, tree.find("0.0").unwrap()), Some("to"));
        assert_eq!(syntax.missing(tree, tree.find("0.1").unwrap()), None);
        assert_eq!(lookup("sleep").syntax.default_of("duration"), Some("1000"));
    }

    #[test]
    fn test_every_tag_is_registered_once() {
        let mut seen = std::collections::HashSet::new();
        for entry in REGISTRY {
            for tag in entry.tags {
                assert!(seen.insert(*tag), "{} registered twice", tag);
            }
        }
    }
}
