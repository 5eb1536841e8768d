use serde::{Deserialize, Serialize};

/// Provider entry of the Claude Code and Codex config files.
/// Only the fields the endpoint registry needs are modelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "apiURL")]
    pub api_url: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEnvelope {
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
}

/// Provider entry of the Gemini config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiProviderEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub enabled: bool,
}
