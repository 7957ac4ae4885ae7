use crate::api::{edge_tts, gemini, pexels, sheets};
use crate::captions;
use crate::config::Config;
use crate::ffmpeg;
use crate::request::{PipelineError, RenderedVideo, VideoRequest};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;
use walkdir::WalkDir;

/// Concurrent clip downloads.
const DOWNLOAD_WORKERS: usize = 4;
/// Search depth per vibe tag.
const SEARCH_PER_PAGE: u32 = 10;
/// Breathing room after the narration ends, seconds.
const AUDIO_TAIL_SECONDS: f64 = 0.5;

fn new_run_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn ensure_dir(path: &Path) -> Result<()> {
    if !dir_exists(path).await {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// The manual clean-up action: empty the runs directory without removing it.
pub async fn clear_runs_dir(cfg: &Config) -> Result<usize> {
    let dir = Path::new(&cfg.runs_dir);
    if !dir_exists(dir).await {
        return Ok(0);
    }

    let mut removed = 0usize;
    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if fs::remove_dir(path).await.is_ok() {
                removed += 1;
            }
        } else if fs::remove_file(path).await.is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Gather `wanted` downloadable files by round-robining across the search
/// terms, so a multi-vibe request mixes footage instead of draining one
/// query first.
fn pick_files(
    pools: &[Vec<pexels::PexelsVideo>],
    wanted: usize,
) -> Vec<(u64, String)> {
    let mut picked: Vec<(u64, String)> = Vec::new();
    let mut cursors = vec![0usize; pools.len()];

    while picked.len() < wanted {
        let mut advanced = false;
        for (pool, cursor) in pools.iter().zip(cursors.iter_mut()) {
            while *cursor < pool.len() && picked.len() < wanted {
                let video = &pool[*cursor];
                *cursor += 1;
                if picked.iter().any(|(id, _)| *id == video.id) {
                    continue;
                }
                if let Some(file) = pexels::best_file(video) {
                    picked.push((video.id, file.link.clone()));
                    advanced = true;
                    break;
                }
            }
        }
        if !advanced {
            break;
        }
    }

    picked
}

async fn download_clips(
    client: &reqwest::Client,
    files: &[(u64, String)],
    run_dir: &Path,
) -> Vec<PathBuf> {
    let semaphore = Arc::new(Semaphore::new(DOWNLOAD_WORKERS));
    let mut handles = Vec::with_capacity(files.len());

    for (idx, (video_id, url)) in files.iter().enumerate() {
        let permit_pool = Arc::clone(&semaphore);
        let client = client.clone();
        let url = url.clone();
        let dest = run_dir.join(format!("source_{}.mp4", idx + 1));
        let video_id = *video_id;

        handles.push(tokio::spawn(async move {
            let _permit = permit_pool.acquire_owned().await.ok()?;
            match pexels::download_file(&client, &url, &dest).await {
                Ok(()) => Some(dest),
                Err(err) => {
                    logw(format!("Download failed for video {}: {}", video_id, err));
                    None
                }
            }
        }));
    }

    // Collect in submission order; a panicked task just drops its slot.
    let mut downloaded = Vec::new();
    for handle in handles {
        if let Ok(Some(path)) = handle.await {
            downloaded.push(path);
        }
    }
    downloaded
}

async fn fetch_footage(
    client: &reqwest::Client,
    cfg: &Config,
    request: &VideoRequest,
    run_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let terms = request.search_terms();
    let wanted = request.clamped_clip_count() as usize;

    let mut pools = Vec::with_capacity(terms.len());
    for term in &terms {
        logi(format!("Searching stock footage: \"{}\"", term));
        match pexels::search_videos(client, cfg, term, SEARCH_PER_PAGE).await {
            Ok(videos) => {
                logok(format!("\"{}\": {} results", term, videos.len()));
                pools.push(videos);
            }
            Err(err) => {
                logw(format!("Search failed for \"{}\": {}", term, err));
                pools.push(Vec::new());
            }
        }
    }

    let files = pick_files(&pools, wanted);
    if files.is_empty() {
        anyhow::bail!("no downloadable footage for terms: {}", terms.join(", "));
    }
    if files.len() < wanted {
        logw(format!(
            "Only {} of {} requested clips available; continuing.",
            files.len(),
            wanted
        ));
    }

    logi(format!(
        "Downloading {} clips ({} workers)...",
        files.len(),
        DOWNLOAD_WORKERS
    ));
    let downloaded = download_clips(client, &files, run_dir).await;
    if downloaded.is_empty() {
        anyhow::bail!("all {} clip downloads failed", files.len());
    }
    logok(format!("Downloaded {} clips", downloaded.len()));

    Ok(downloaded)
}

struct Assembly {
    video: PathBuf,
    subtitles: Option<PathBuf>,
    duration: f64,
}

async fn assemble_video(
    request: &VideoRequest,
    run_dir: &Path,
    sources: &[PathBuf],
    narration: &Path,
    cues: &[captions::Cue],
) -> Result<Assembly> {
    let audio_duration = ffmpeg::ffprobe_duration_seconds(narration)
        .await
        .context("bad narration duration")?;

    let target_total = ffmpeg::clamp_total_duration(audio_duration + AUDIO_TAIL_SECONDS);
    let count = sources.len();
    let clip_duration = if count > 1 {
        (target_total + (count as f64 - 1.0) * ffmpeg::CROSSFADE_SECONDS) / count as f64
    } else {
        target_total
    };
    logi(format!(
        "Assembly plan: {} clips x {:.2}s -> {:.2}s total (narration {:.2}s)",
        count, clip_duration, target_total, audio_duration
    ));

    let mut normalized = Vec::with_capacity(count);
    for (idx, source) in sources.iter().enumerate() {
        let src_duration = match ffmpeg::ffprobe_duration_seconds(source).await {
            Ok(v) => v,
            Err(_) => {
                logw(format!("Skipping unreadable clip: {}", source.display()));
                continue;
            }
        };

        let out = run_dir.join(format!("norm_{}.mp4", idx + 1));
        if ffmpeg::ffmpeg_normalize_clip(source, src_duration, clip_duration, &out).await? {
            normalized.push(out);
        } else {
            logw(format!("Normalization failed for {}", source.display()));
        }
    }
    if normalized.is_empty() {
        anyhow::bail!("no clips survived normalization");
    }
    logok(format!("Normalized {} clips to 1080x1920", normalized.len()));

    let silent = run_dir.join("silent.mp4");
    if !ffmpeg::ffmpeg_concat_crossfade(&normalized, clip_duration, &silent).await? {
        anyhow::bail!("crossfade concat failed");
    }

    let base = run_dir.join("base.mp4");
    if !ffmpeg::ffmpeg_mux_audio(&silent, narration, target_total, &base).await? {
        anyhow::bail!("audio mux failed");
    }
    let base_duration = ffmpeg::ffprobe_duration_seconds(&base)
        .await
        .unwrap_or(target_total);
    logok(format!("Base render ready: {:.2}s", base_duration));

    let srt = run_dir.join("captions.srt");
    captions::write_cue_file(&srt, cues).await?;

    if !request.captions {
        return Ok(Assembly {
            video: base,
            subtitles: Some(srt),
            duration: base_duration,
        });
    }

    let burned = run_dir.join("final.mp4");
    logi("Burning captions into frames...");
    match ffmpeg::ffmpeg_burn_subtitles(&base, &srt, &burned).await {
        Ok(true) => {
            logok(format!("Caption burn-in OK: {}", burned.display()));
            Ok(Assembly {
                video: burned,
                subtitles: Some(srt),
                duration: base_duration,
            })
        }
        Ok(false) | Err(_) => {
            logw("Caption burn-in failed; delivering base render.");
            Ok(Assembly {
                video: base,
                subtitles: Some(srt),
                duration: base_duration,
            })
        }
    }
}

async fn record_history(cfg: &Config, request: &VideoRequest, rendered: &RenderedVideo) {
    if !cfg.has_sheet_store() {
        return;
    }

    let client = reqwest::Client::new();
    let store = sheets::SheetsClient::new(client, &cfg.spreadsheet_id, &cfg.sheets_token);
    let row = vec![
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        request.topic.clone(),
        rendered.video.display().to_string(),
        format!("{:.1}s", rendered.duration),
    ];

    // Bookkeeping only; the video is already on disk.
    match store.append_history(&row).await {
        Ok(()) => logok("History row appended."),
        Err(err) => logw(format!("History append failed: {}", err)),
    }
}

/// Produce one video for `request`. Every artifact lands in a fresh
/// `runs/<id>/` directory, so concurrent runs cannot clobber each other
/// and clean-up is a directory delete.
pub async fn run_generation(
    cfg: &Config,
    request: &VideoRequest,
) -> Result<RenderedVideo, PipelineError> {
    let run_id = new_run_id();
    let run_dir = Path::new(&cfg.runs_dir).join(&run_id);
    ensure_dir(&run_dir).await.map_err(PipelineError::Assembly)?;
    logi(format!("=== Run {} ({}) ===", run_id, request.topic));

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")
        .map_err(PipelineError::Footage)?;

    logi("Writing script...");
    let script = gemini::generate_script(&client, cfg, &request.topic, &request.vibes)
        .await
        .map_err(PipelineError::Script)?;
    let script_path = run_dir.join("script.txt");
    fs::write(&script_path, &script)
        .await
        .context("write script")
        .map_err(PipelineError::Script)?;
    logok(format!("Script saved: {}", script_path.display()));

    let voice = request.voice.as_deref().unwrap_or(&cfg.voice);
    logi(format!("Synthesizing narration (voice: {})...", voice));
    let synthesis = edge_tts::synthesize(&script, voice)
        .await
        .map_err(PipelineError::Synthesis)?;
    let narration = run_dir.join("voice.mp3");
    edge_tts::write_audio(&synthesis, &narration)
        .await
        .map_err(PipelineError::Synthesis)?;
    logok(format!("Narration saved: {}", narration.display()));

    let words = if synthesis.words.is_empty() {
        let audio_duration = ffmpeg::ffprobe_duration_seconds(&narration)
            .await
            .context("bad narration duration")
            .map_err(PipelineError::Synthesis)?;
        logi(format!(
            "Deriving caption timing across {:.2}s of audio...",
            audio_duration
        ));
        captions::uniform_word_timings(&script, audio_duration)
    } else {
        synthesis.words.clone()
    };
    let cues = captions::group_cues(&words);
    logok(format!("Caption cues: {}", cues.len()));

    let sources = fetch_footage(&client, cfg, request, &run_dir)
        .await
        .map_err(PipelineError::Footage)?;

    let assembly = assemble_video(request, &run_dir, &sources, &narration, &cues)
        .await
        .map_err(PipelineError::Assembly)?;

    let rendered = RenderedVideo {
        run_id: run_id.clone(),
        run_dir: run_dir.clone(),
        video: assembly.video,
        script: script_path,
        subtitles: assembly.subtitles,
        duration: assembly.duration,
    };

    record_history(cfg, request, &rendered).await;

    logok(format!(
        "DONE: {} ({:.2}s)",
        rendered.video.display(),
        rendered.duration
    ));
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(id: u64, widths: &[i64]) -> pexels::PexelsVideo {
        pexels::PexelsVideo {
            id,
            duration: 10.0,
            video_files: widths
                .iter()
                .map(|w| pexels::VideoFile {
                    width: Some(*w),
                    height: Some(1920),
                    link: format!("https://cdn.example/{}_{}.mp4", id, w),
                })
                .collect(),
        }
    }

    #[test]
    fn run_ids_are_unique_and_lowercase() {
        let a = new_run_id();
        let b = new_run_id();
        assert_eq!(a.len(), 10);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn pick_files_round_robins_across_pools() {
        let pools = vec![
            vec![video(1, &[1080]), video(2, &[1080])],
            vec![video(3, &[1080]), video(4, &[1080])],
        ];
        let picked = pick_files(&pools, 3);
        let ids: Vec<u64> = picked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn pick_files_skips_duplicates_and_unusable() {
        let pools = vec![
            vec![video(1, &[1080]), video(1, &[1080]), video(2, &[])],
            vec![video(3, &[720])],
        ];
        let picked = pick_files(&pools, 5);
        let ids: Vec<u64> = picked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn pick_files_stops_when_pools_run_dry() {
        let pools = vec![vec![video(7, &[1080])]];
        assert_eq!(pick_files(&pools, 4).len(), 1);
        assert!(pick_files(&[], 4).is_empty());
    }

    #[test]
    fn clip_duration_covers_crossfade_overlap() {
        // 4 clips at D seconds with 0.5s fades must span the target.
        let target = 30.0;
        let count = 4;
        let d = (target + (count as f64 - 1.0) * ffmpeg::CROSSFADE_SECONDS) / count as f64;
        let total = ffmpeg::xfade_total_duration(count, d, ffmpeg::CROSSFADE_SECONDS);
        assert!((total - target).abs() < 1e-9);
    }
}
