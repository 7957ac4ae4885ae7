use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

const PEXELS_SEARCH_URL: &str = "https://api.pexels.com/videos/search";

/// Width the selection policy aims for; matches the render target.
pub const PREFERRED_WIDTH: i64 = 1080;

#[derive(Debug, Clone, Deserialize)]
pub struct VideoFile {
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    pub link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PexelsVideo {
    pub id: u64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

/// Ranked portrait-orientation search for one keyword.
pub async fn search_videos(
    client: &Client,
    cfg: &Config,
    query: &str,
    per_page: u32,
) -> Result<Vec<PexelsVideo>> {
    let resp = client
        .get(PEXELS_SEARCH_URL)
        .header("Authorization", &cfg.pexels_key)
        .query(&[
            ("query", query),
            ("orientation", "portrait"),
            ("per_page", &per_page.to_string()),
        ])
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("Pexels request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let raw = resp.text().await.unwrap_or_default();
        let snippet = raw.chars().take(400).collect::<String>();
        logw(format!("Pexels HTTP {} body: {}", status.as_u16(), snippet));
        anyhow::bail!("Pexels search HTTP {}", status.as_u16());
    }

    let parsed: SearchResponse = resp.json().await.context("Pexels response parse failed")?;
    Ok(parsed.videos)
}

/// The renditions list carries several encodes per hit; pick the one whose
/// width sits closest to the render target (an exact 1080 wins outright).
pub fn best_file(video: &PexelsVideo) -> Option<&VideoFile> {
    video
        .video_files
        .iter()
        .filter(|f| f.width.is_some())
        .min_by_key(|f| (f.width.unwrap_or(0) - PREFERRED_WIDTH).abs())
}

pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    let resp = client
        .get(url)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .with_context(|| format!("clip download failed: {}", url))?;

    if !resp.status().is_success() {
        anyhow::bail!("clip download HTTP {} for {}", resp.status().as_u16(), url);
    }

    let bytes = resp.bytes().await.context("clip download read failed")?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await.ok();
    }
    fs::write(dest, &bytes)
        .await
        .with_context(|| format!("write clip: {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_with_widths(widths: &[i64]) -> PexelsVideo {
        PexelsVideo {
            id: 1,
            duration: 12.0,
            video_files: widths
                .iter()
                .map(|w| VideoFile {
                    width: Some(*w),
                    height: Some(w * 16 / 9),
                    link: format!("https://cdn.example/{}.mp4", w),
                })
                .collect(),
        }
    }

    #[test]
    fn exact_width_match_wins() {
        let video = video_with_widths(&[640, 1080, 2160]);
        assert_eq!(best_file(&video).unwrap().width, Some(1080));
    }

    #[test]
    fn closest_width_wins_without_exact_match() {
        let video = video_with_widths(&[360, 960, 2560]);
        assert_eq!(best_file(&video).unwrap().width, Some(960));
    }

    #[test]
    fn files_without_width_are_skipped() {
        let mut video = video_with_widths(&[720]);
        video.video_files.push(VideoFile {
            width: None,
            height: None,
            link: "https://cdn.example/unknown.mp4".to_string(),
        });
        assert_eq!(best_file(&video).unwrap().width, Some(720));
    }

    #[test]
    fn no_usable_files_yields_none() {
        let video = PexelsVideo {
            id: 9,
            duration: 0.0,
            video_files: vec![],
        };
        assert!(best_file(&video).is_none());
    }

    #[test]
    fn search_response_parses_api_shape() {
        let raw = r#"{
            "page": 1,
            "per_page": 2,
            "videos": [
                {
                    "id": 857251,
                    "duration": 14,
                    "video_files": [
                        {"id": 1, "quality": "hd", "width": 1080, "height": 1920,
                         "link": "https://player.pexels.com/a.mp4"},
                        {"id": 2, "quality": "sd", "width": 540, "height": 960,
                         "link": "https://player.pexels.com/b.mp4"}
                    ]
                }
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.videos.len(), 1);
        assert_eq!(parsed.videos[0].video_files.len(), 2);
        assert!((parsed.videos[0].duration - 14.0).abs() < 1e-9);
    }

    #[test]
    fn empty_response_parses() {
        let parsed: SearchResponse = serde_json::from_str(r#"{"videos": []}"#).unwrap();
        assert!(parsed.videos.is_empty());
    }
}
