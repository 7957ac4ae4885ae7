use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "pexels_api_key")]
    pub pexels_key: String,
    #[serde(rename = "gemini_api_key")]
    pub gemini_key: String,
    #[serde(rename = "gemini_model")]
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(rename = "voice")]
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Spreadsheet backing the Accounts/History worksheets. Optional: the
    /// generator works without it, the account commands do not.
    #[serde(rename = "spreadsheet_id")]
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(rename = "sheets_access_token")]
    #[serde(default)]
    pub sheets_token: String,
    #[serde(rename = "runs_dir")]
    #[serde(default = "default_runs_dir")]
    pub runs_dir: String,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_voice() -> String {
    "en-US-ChristopherNeural".to_string()
}

fn default_runs_dir() -> String {
    "runs".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.pexels_key.is_empty() {
            anyhow::bail!("config.json: pexels_api_key missing");
        }
        if config.gemini_key.is_empty() {
            anyhow::bail!("config.json: gemini_api_key missing");
        }

        Ok(config)
    }

    pub fn has_sheet_store(&self) -> bool {
        !self.spreadsheet_id.is_empty() && !self.sheets_token.is_empty()
    }
}
