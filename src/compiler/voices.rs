//! Voice catalog, pending voice requests, and preset assignment

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::provider::Provider;

/// A voice ready for speech synthesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSpec {
    /// Provider voice identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Descriptive keywords
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form description
    #[serde(default)]
    pub description: String,
}

/// A voice declared without an id, waiting for resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceRequest {
    /// Character name the voice is for
    pub name: String,
    /// Description used for generation and keyword matching
    #[serde(default)]
    pub prompt: String,
    /// Extra keywords
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Voices by character name
pub type VoiceMap = BTreeMap<String, VoiceSpec>;

/// Built-in preset catalog used when voice generation is off
pub fn default_presets() -> Vec<VoiceSpec> {
    let preset = |id: &str, name: &str, tags: &[&str], description: &str| VoiceSpec {
        id: id.to_string(),
        name: name.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        description: description.to_string(),
    };
    vec![
        preset("preset-narrator", "Narrator", &["narrator", "calm", "neutral", "adult"], "Even, warm storyteller"),
        preset("preset-elder", "Elder", &["old", "elderly", "wise", "male", "deep"], "Gravelly older man"),
        preset("preset-matriarch", "Matriarch", &["old", "elderly", "female", "stern"], "Measured older woman"),
        preset("preset-youth", "Youth", &["young", "child", "bright", "energetic"], "Quick, light young voice"),
        preset("preset-soldier", "Soldier", &["gruff", "male", "military", "guard", "rough"], "Clipped, commanding man"),
        preset("preset-scholar", "Scholar", &["female", "precise", "academic", "clear"], "Crisp, articulate woman"),
        preset("preset-rogue", "Rogue", &["sly", "smooth", "male", "whisper"], "Low, confident drawl"),
        preset("preset-oracle", "Oracle", &["mysterious", "ethereal", "female", "whisper"], "Breathy, distant voice"),
    ]
}

fn keywords(parts: &[&str]) -> BTreeSet<String> {
    parts
        .iter()
        .flat_map(|part| part.split(|ch: char| !ch.is_alphanumeric()))
        .map(|word| word.to_lowercase())
        .filter(|word| word.len() >= 3)
        .collect()
}

fn score(request: &VoiceRequest, preset: &VoiceSpec) -> usize {
    let mut wanted: Vec<&str> = vec![request.prompt.as_str()];
    wanted.extend(request.tags.iter().map(String::as_str));
    let mut offered: Vec<&str> = vec![preset.name.as_str(), preset.description.as_str()];
    offered.extend(preset.tags.iter().map(String::as_str));
    keywords(&wanted).intersection(&keywords(&offered)).count()
}

/// Deterministically assign presets to pending voices.
///
/// Each request takes its best keyword match (earliest preset on ties) and
/// removes it from the pool, so no preset is handed out twice while
/// candidates remain. Requests left without candidates are skipped.
pub fn assign_presets(pending: &[VoiceRequest], presets: &[VoiceSpec]) -> VoiceMap {
    let mut pool: Vec<&VoiceSpec> = presets.iter().collect();
    let mut assigned = VoiceMap::new();
    for request in pending {
        let best = pool
            .iter()
            .enumerate()
            .fold(None::<(usize, usize)>, |best, (position, preset)| {
                let candidate = score(request, preset);
                match best {
                    Some((_, top)) if top >= candidate => best,
                    _ => Some((position, candidate)),
                }
            });
        match best {
            Some((position, matched)) => {
                let preset = pool.remove(position);
                tracing::debug!("assigned preset {} to {} (score {})", preset.id, request.name, matched);
                assigned.insert(request.name.clone(), preset.clone());
            }
            None => tracing::warn!("no voice preset left for {}", request.name),
        }
    }
    assigned
}

/// Generate voices through the provider; failures are logged and skipped
pub async fn generate_voices(pending: &[VoiceRequest], provider: &dyn Provider) -> VoiceMap {
    let mut generated = VoiceMap::new();
    for request in pending {
        match provider.generate_voice(request).await {
            Ok(id) => {
                generated.insert(
                    request.name.clone(),
                    VoiceSpec {
                        id,
                        name: request.name.clone(),
                        tags: request.tags.clone(),
                        description: request.prompt.clone(),
                    },
                );
            }
            Err(failure) => tracing::warn!("voice generation for {} failed: {}", request.name, failure),
        }
    }
    generated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, prompt: &str) -> VoiceRequest {
        VoiceRequest {
            name: name.to_string(),
            prompt: prompt.to_string(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_best_match_wins_and_is_consumed() {
        let presets = default_presets();
        let pending = vec![
            request("Guard", "gruff military guard"),
            request("Captain", "gruff military officer"),
        ];
        let assigned = assign_presets(&pending, &presets);
        assert_eq!(assigned["Guard"].id, "preset-soldier");
        assert_ne!(assigned["Captain"].id, "preset-soldier");
    }

    #[test]
    fn test_exhausted_pool_skips_remaining() {
        let presets = default_presets()[..1].to_vec();
        let pending = vec![request("A", "calm"), request("B", "calm")];
        let assigned = assign_presets(&pending, &presets);
        assert_eq!(assigned.len(), 1);
        assert!(assigned.contains_key("A"));
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let presets = default_presets();
        let pending = vec![request("Old", "elderly wise man"), request("Kid", "young bright")];
        assert_eq!(assign_presets(&pending, &presets), assign_presets(&pending, &presets));
    }
}
