use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

pub const TARGET_WIDTH: i32 = 1080;
pub const TARGET_HEIGHT: i32 = 1920;
pub const TARGET_FPS: i32 = 30;

/// Final render length bounds, seconds (inclusive).
pub const MIN_TOTAL_DURATION: f64 = 15.0;
pub const MAX_TOTAL_DURATION: f64 = 58.0;

pub const CROSSFADE_SECONDS: f64 = 0.5;

const CAPTION_STYLE: &str =
    "FontName=Arial,FontSize=16,PrimaryColour=&HFFFFFF&,OutlineColour=&H000000&,Outline=2,Shadow=0,Bold=1,MarginV=60";

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(i32, i32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0);

    if w <= 0 || h <= 0 {
        return Err(anyhow::anyhow!("Invalid dimensions"));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

pub fn clamp_total_duration(seconds: f64) -> f64 {
    seconds.clamp(MIN_TOTAL_DURATION, MAX_TOTAL_DURATION)
}

/// Scale-and-crop plan that turns a source of arbitrary aspect ratio into
/// an exact 1080x1920 frame: cover-scale preserving aspect, then a centered
/// crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizePlan {
    pub scale_w: i32,
    pub scale_h: i32,
    pub crop_x: i32,
    pub crop_y: i32,
}

pub fn normalize_plan(src_w: i32, src_h: i32) -> NormalizePlan {
    // Wider than 9:16 -> match height, overflow width. Otherwise match width.
    let (scale_w, scale_h) = if src_w as i64 * TARGET_HEIGHT as i64 >= src_h as i64 * TARGET_WIDTH as i64 {
        let w = ((src_w as f64) * (TARGET_HEIGHT as f64) / (src_h as f64)).round() as i32;
        (w.max(TARGET_WIDTH), TARGET_HEIGHT)
    } else {
        let h = ((src_h as f64) * (TARGET_WIDTH as f64) / (src_w as f64)).round() as i32;
        (TARGET_WIDTH, h.max(TARGET_HEIGHT))
    };

    NormalizePlan {
        scale_w,
        scale_h,
        crop_x: (scale_w - TARGET_WIDTH) / 2,
        crop_y: (scale_h - TARGET_HEIGHT) / 2,
    }
}

impl NormalizePlan {
    pub fn filter(&self) -> String {
        format!(
            "scale={}:{},crop={}:{}:{}:{},setsar=1,fps={}",
            self.scale_w,
            self.scale_h,
            TARGET_WIDTH,
            TARGET_HEIGHT,
            self.crop_x,
            self.crop_y,
            TARGET_FPS
        )
    }
}

/// Re-encode one downloaded clip to the shared portrait format and the
/// shared per-clip duration. Clips shorter than the target are looped,
/// longer ones are trimmed. The result carries no audio track.
pub async fn ffmpeg_normalize_clip(
    input: &Path,
    src_duration: f64,
    clip_duration: f64,
    out_mp4: &Path,
) -> Result<bool> {
    if clip_duration <= 0.1 {
        return Ok(false);
    }

    let (w, h) = ffprobe_video_dimensions(input).await?;
    let plan = normalize_plan(w, h);

    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];

    if src_duration < clip_duration {
        args.push("-stream_loop".to_string());
        args.push("-1".to_string());
    }

    args.extend([
        "-i".to_string(),
        input.display().to_string(),
        "-t".to_string(),
        format!("{:.3}", clip_duration),
        "-an".to_string(),
        "-vf".to_string(),
        plan.filter(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// The xfade chain for `count` equal-length clips. Each fade overlaps the
/// previous output by `fade` seconds, so offset k lands at k*(dur-fade).
pub fn xfade_filter(count: usize, clip_duration: f64, fade: f64) -> String {
    let mut filter = String::new();
    let mut prev = "[0:v]".to_string();
    for i in 1..count {
        let offset = i as f64 * (clip_duration - fade);
        let label = if i + 1 == count {
            "[v]".to_string()
        } else {
            format!("[x{}]", i)
        };
        filter.push_str(&format!(
            "{}[{}:v]xfade=transition=fade:duration={:.3}:offset={:.3}{};",
            prev, i, fade, offset, label
        ));
        prev = label;
    }
    filter.pop();
    filter
}

/// Total length the xfade chain produces: n clips minus the overlapped fades.
pub fn xfade_total_duration(count: usize, clip_duration: f64, fade: f64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    count as f64 * clip_duration - (count.saturating_sub(1)) as f64 * fade
}

/// Crossfade-concatenate the normalized clips into one silent composite.
/// A single clip is passed through as-is.
pub async fn ffmpeg_concat_crossfade(
    clips: &[std::path::PathBuf],
    clip_duration: f64,
    out_mp4: &Path,
) -> Result<bool> {
    if clips.is_empty() {
        return Ok(false);
    }
    if clips.len() == 1 {
        tokio::fs::copy(&clips[0], out_mp4)
            .await
            .with_context(|| format!("copy single clip to {}", out_mp4.display()))?;
        return Ok(out_mp4.exists());
    }

    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ];
    for clip in clips {
        args.push("-i".to_string());
        args.push(clip.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        xfade_filter(clips.len(), clip_duration, CROSSFADE_SECONDS),
        "-map".to_string(),
        "[v]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        out_mp4.display().to_string(),
    ]);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Attach the narration track and clamp the render to `total_duration`.
pub async fn ffmpeg_mux_audio(
    video_in: &Path,
    audio_in: &Path,
    total_duration: f64,
    out_mp4: &Path,
) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-i".to_string(),
        audio_in.display().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-t".to_string(),
        format!("{:.3}", total_duration),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub fn burn_filter(srt_path: &Path) -> String {
    format!(
        "subtitles={}:force_style='{}'",
        srt_path.display(),
        CAPTION_STYLE
    )
}

/// Second encode pass that composites the cue file into the frames.
pub async fn ffmpeg_burn_subtitles(
    video_in: &Path,
    srt_path: &Path,
    out_mp4: &Path,
) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video_in.display().to_string(),
        "-vf".to_string(),
        burn_filter(srt_path),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn landscape_source_crops_to_portrait() {
        // 1920x1080 -> scale to 3413x1920, crop the middle 1080 columns.
        let plan = normalize_plan(1920, 1080);
        assert_eq!(plan.scale_h, TARGET_HEIGHT);
        assert!(plan.scale_w >= TARGET_WIDTH);
        assert_eq!(plan.crop_x, (plan.scale_w - TARGET_WIDTH) / 2);
        assert_eq!(plan.crop_y, 0);
        assert!(plan.crop_x + TARGET_WIDTH <= plan.scale_w);
    }

    #[test]
    fn tall_source_crops_vertically() {
        // 1080x2400 is taller than 9:16.
        let plan = normalize_plan(1080, 2400);
        assert_eq!(plan.scale_w, TARGET_WIDTH);
        assert!(plan.scale_h >= TARGET_HEIGHT);
        assert_eq!(plan.crop_x, 0);
        assert!(plan.crop_y + TARGET_HEIGHT <= plan.scale_h);
    }

    #[test]
    fn exact_portrait_needs_no_crop() {
        let plan = normalize_plan(1080, 1920);
        assert_eq!(
            plan,
            NormalizePlan {
                scale_w: 1080,
                scale_h: 1920,
                crop_x: 0,
                crop_y: 0,
            }
        );
    }

    #[test]
    fn arbitrary_aspects_always_cover_target() {
        for (w, h) in [(640, 360), (4096, 2160), (720, 1280), (500, 500), (31, 97)] {
            let plan = normalize_plan(w, h);
            assert!(plan.scale_w >= TARGET_WIDTH, "{}x{}", w, h);
            assert!(plan.scale_h >= TARGET_HEIGHT, "{}x{}", w, h);
            assert!(plan.crop_x >= 0 && plan.crop_x + TARGET_WIDTH <= plan.scale_w);
            assert!(plan.crop_y >= 0 && plan.crop_y + TARGET_HEIGHT <= plan.scale_h);
            assert!(plan.filter().contains("crop=1080:1920"));
        }
    }

    #[test]
    fn duration_clamp_bounds() {
        assert_eq!(clamp_total_duration(3.0), MIN_TOTAL_DURATION);
        assert_eq!(clamp_total_duration(120.0), MAX_TOTAL_DURATION);
        assert_eq!(clamp_total_duration(30.0), 30.0);
        assert_eq!(clamp_total_duration(15.0), 15.0);
        assert_eq!(clamp_total_duration(58.0), 58.0);
    }

    #[test]
    fn xfade_chain_for_three_clips() {
        let filter = xfade_filter(3, 10.0, 0.5);
        assert_eq!(
            filter,
            "[0:v][1:v]xfade=transition=fade:duration=0.500:offset=9.500[x1];\
             [x1][2:v]xfade=transition=fade:duration=0.500:offset=19.000[v]"
        );
    }

    #[test]
    fn xfade_totals() {
        assert!((xfade_total_duration(4, 10.0, 0.5) - 38.5).abs() < 1e-9);
        assert!((xfade_total_duration(1, 10.0, 0.5) - 10.0).abs() < 1e-9);
        assert_eq!(xfade_total_duration(0, 10.0, 0.5), 0.0);
    }

    #[test]
    fn burn_filter_includes_style() {
        let filter = burn_filter(&PathBuf::from("runs/abc/captions.srt"));
        assert!(filter.starts_with("subtitles=runs/abc/captions.srt:force_style="));
        assert!(filter.contains("OutlineColour=&H000000&"));
    }
}
