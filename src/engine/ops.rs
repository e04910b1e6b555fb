//! Operations emitted to the playback client

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tree::{NodeId, NodeTree};

/// Identity of the node that produced an event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Address at the time of the event
    pub addr: String,
    /// Node type
    #[serde(rename = "type")]
    pub kind: String,
    /// Node attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl NodeInfo {
    /// Capture a node's identity
    pub fn of(tree: &NodeTree, id: NodeId) -> Self {
        let node = tree.get(id);
        Self {
            addr: node.addr.clone(),
            kind: node.kind.clone(),
            attributes: node
                .attrs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

/// Something that happened in the story: a spoken line, a player reply, a read passage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryEvent {
    /// Producing node
    pub node: NodeInfo,
    /// Rendered text
    pub body: String,
    /// Speaker
    pub from: String,
    /// Addressees
    #[serde(default)]
    pub to: Vec<String>,
    /// Observers
    #[serde(default)]
    pub obs: Vec<String>,
    /// Tag rules that hold for the speaker
    #[serde(default)]
    pub tags: Vec<String>,
    /// Story clock in epoch milliseconds
    pub time: i64,
}

/// One ordered instruction for the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Operation {
    /// Play audio (speech, sound, music); `media` may be empty when audio is disabled
    PlayMedia {
        /// Media URL
        media: String,
        /// Playback volume, 0..1
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f64>,
        /// Fade-in length
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fade_in_ms: Option<u64>,
        /// Total fade duration
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fade_duration_ms: Option<u64>,
        /// Play under subsequent media
        #[serde(default)]
        background: bool,
        /// Event the media belongs to
        event: Option<StoryEvent>,
    },
    /// Display an image
    ShowMedia {
        /// Media URL
        media: String,
    },
    /// Ask the player for input
    GetInput {
        /// Rendered attributes of the input node
        attributes: BTreeMap<String, String>,
    },
    /// Wait before continuing playback
    Sleep {
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// The story is over
    StoryEnd,
    /// The story reported an error
    StoryError {
        /// Reason
        reason: String,
    },
}

impl Operation {
    /// Spoken line with its event and no audio settings
    pub fn line(media: impl Into<String>, event: StoryEvent) -> Self {
        Operation::PlayMedia {
            media: media.into(),
            volume: None,
            fade_in_ms: None,
            fade_duration_ms: None,
            background: false,
            event: Some(event),
        }
    }

    /// Whether the client must play or show something
    pub fn is_media(&self) -> bool {
        matches!(self, Operation::PlayMedia { .. } | Operation::ShowMedia { .. })
    }

    /// Attached event, if any
    pub fn event(&self) -> Option<&StoryEvent> {
        match self {
            Operation::PlayMedia { event, .. } => event.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operations_serialize_with_kebab_tags() {
        let op = Operation::Sleep { duration_ms: 250 };
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"type": "sleep", "duration_ms": 250}));
        assert_eq!(
            serde_json::to_value(Operation::StoryEnd).unwrap(),
            json!({"type": "story-end"})
        );

        let line = Operation::line("", StoryEvent::default());
        let encoded = serde_json::to_value(&line).unwrap();
        assert_eq!(encoded["type"], json!("play-media"));
        assert!(encoded.get("volume").is_none());
        let decoded: Operation = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, line);
    }

    #[test]
    fn test_media_classification() {
        assert!(Operation::ShowMedia { media: "x".into() }.is_media());
        assert!(!Operation::Sleep { duration_ms: 1 }.is_media());
        assert!(Operation::line("", StoryEvent::default()).event().is_some());
    }
}
