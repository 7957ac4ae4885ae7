use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Client;
use serde_json::json;

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

/// Target spoken length the prompt asks for; the final render is clamped
/// later anyway.
const TARGET_WORDS: &str = "100-130";

fn build_prompt(topic: &str, vibes: &[String]) -> String {
    let vibe_line = if vibes.is_empty() {
        String::new()
    } else {
        format!("Tone/vibe keywords: {}.\n", vibes.join(", "))
    };

    format!(
        "Write a short motivational voice-over script about: {}.\n{}\
         Rules:\n\
         - {} words total, short punchy sentences.\n\
         - Second person, present tense, direct address.\n\
         - Plain spoken text only: no emojis, no hashtags, no markdown,\n\
           no stage directions, no scene labels, no quotation marks.\n\
         - It will be read aloud verbatim by a narrator.\n",
        topic, vibe_line, TARGET_WORDS
    )
}

fn extract_candidate_text(root: &serde_json::Value) -> Option<String> {
    root.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

fn fence_regex() -> &'static Regex {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    FENCE_RE.get_or_init(|| Regex::new(r"(?s)```[a-zA-Z]*\n?|```").unwrap())
}

fn direction_regex() -> &'static Regex {
    static DIR_RE: OnceCell<Regex> = OnceCell::new();
    DIR_RE.get_or_init(|| Regex::new(r"(?m)^\s*[\[(][^\])]*[\])]\s*$").unwrap())
}

/// Model output arrives with decoration the narrator must not read:
/// markdown fences, wrapping quotes, bracketed stage directions on their
/// own lines. Strip all of it and collapse the whitespace.
pub fn scrub_script(raw: &str) -> String {
    let no_fences = fence_regex().replace_all(raw, "");
    let no_directions = direction_regex().replace_all(&no_fences, "");

    let trimmed = no_directions.trim().trim_matches('"').trim();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub async fn generate_script(
    client: &Client,
    cfg: &Config,
    topic: &str,
    vibes: &[String],
) -> Result<String> {
    let prompt = build_prompt(topic, vibes);

    let body = json!({
        "contents": [
            {"role": "user", "parts": [{"text": prompt}]}
        ],
        "generationConfig": {
            "temperature": 0.9,
        }
    });

    let url = format!(
        "{}/v1beta/models/{}:generateContent",
        GEMINI_BASE, cfg.gemini_model
    );

    let resp = client
        .post(&url)
        .query(&[("key", cfg.gemini_key.as_str())])
        .json(&body)
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await
        .context("Gemini request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        let snippet = raw.chars().take(800).collect::<String>();
        logw(format!("Gemini HTTP {} body: {}", status.as_u16(), snippet));
        anyhow::bail!("Gemini generateContent HTTP {}", status.as_u16());
    }

    let root: serde_json::Value =
        serde_json::from_str(&raw).context("Gemini response was not JSON")?;
    let text = extract_candidate_text(&root)
        .ok_or_else(|| anyhow::anyhow!("Gemini response missing candidate text"))?;

    let script = scrub_script(&text);
    if script.is_empty() {
        anyhow::bail!("Gemini returned an empty script");
    }

    logi(format!(
        "Gemini script received: {} words",
        script.split_whitespace().count()
    ));
    Ok(script)
}
