//! The fixed AI provider set and display-name normalization.

use serde::{Deserialize, Serialize};

/// Canonical provider keys understood by the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    Perplexity,
}

/// Display-name spellings accepted per provider. Matching is
/// case-insensitive; the canonical key is always the lowercase enum name.
const PROVIDER_ALIASES: &[(Provider, &[&str])] = &[
    (Provider::OpenAi, &["openai", "open ai", "chatgpt", "gpt"]),
    (Provider::Anthropic, &["anthropic", "claude"]),
    (Provider::Gemini, &["gemini", "google", "google gemini"]),
    (Provider::Perplexity, &["perplexity", "pplx"]),
];

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Gemini,
        Provider::Perplexity,
    ];

    /// Canonical lowercase key, as sent to the analysis pipeline.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Perplexity => "perplexity",
        }
    }

    /// Resolve a user-supplied provider name to its canonical key.
    pub fn parse(name: &str) -> Option<Provider> {
        let needle = name.trim().to_lowercase();
        PROVIDER_ALIASES
            .iter()
            .find(|(_, aliases)| aliases.contains(&needle.as_str()))
            .map(|(provider, _)| *provider)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Normalize a caller's provider selection to canonical keys.
///
/// Unknown names are dropped; an empty or fully-unknown selection falls back
/// to all available providers.
pub fn normalize_selection(names: &[String]) -> Vec<Provider> {
    let mut selected: Vec<Provider> = Vec::new();
    for name in names {
        if let Some(provider) = Provider::parse(name)
            && !selected.contains(&provider)
        {
            selected.push(provider);
        }
    }
    if selected.is_empty() {
        Provider::ALL.to_vec()
    } else {
        selected
    }
}
