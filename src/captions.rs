use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Words per cue before a forced flush.
const MAX_CUE_WORDS: usize = 3;
/// Trailing pad added to every cue except the last one, seconds.
const CUE_TAIL_PAD: f64 = 0.10;
/// Floor for degenerate cues so end stays strictly after start.
const MIN_CUE_SPAN: f64 = 0.05;

/// One word of narration located inside the synthesized audio, seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub offset: f64,
    pub duration: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Derive per-word timings when the engine reported no boundary events:
/// the audio duration is divided evenly across the script's words.
pub fn uniform_word_timings(script: &str, audio_duration: f64) -> Vec<WordTiming> {
    let words: Vec<&str> = script.split_whitespace().collect();
    if words.is_empty() || audio_duration <= 0.0 {
        return Vec::new();
    }

    let per_word = audio_duration / words.len() as f64;
    words
        .iter()
        .enumerate()
        .map(|(i, w)| WordTiming {
            offset: i as f64 * per_word,
            duration: per_word,
            text: (*w).to_string(),
        })
        .collect()
}

fn ends_sentence(word: &str) -> bool {
    word.trim_end_matches(['"', '\'', ')']).ends_with(['.', '!', '?'])
}

/// Group word timings into display cues. Words accumulate into a buffer
/// that flushes at three words, at terminal punctuation, or at the end of
/// the script. Non-final cues keep a short trailing pad on screen.
pub fn group_cues(words: &[WordTiming]) -> Vec<Cue> {
    let mut cues: Vec<Cue> = Vec::new();
    let mut buffer: Vec<&WordTiming> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        buffer.push(word);

        let last_word = i + 1 == words.len();
        if buffer.len() >= MAX_CUE_WORDS || ends_sentence(&word.text) || last_word {
            let start = buffer[0].offset;
            let mut end = word.offset + word.duration;
            if !last_word {
                end += CUE_TAIL_PAD;
            }
            if end <= start {
                end = start + MIN_CUE_SPAN;
            }

            let text = buffer
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            cues.push(Cue { start, end, text });
            buffer.clear();
        }
    }

    cues
}

/// `125.4` -> `00:02:05.400`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let m = (total_s / 60) % 60;
    let h = total_s / 3600;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

pub fn render_cue_file(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue.text
        ));
    }
    out
}

pub async fn write_cue_file(path: &Path, cues: &[Cue]) -> Result<()> {
    let mut out = fs::File::create(path)
        .await
        .with_context(|| format!("create cue file: {}", path.display()))?;
    out.write_all(render_cue_file(cues).as_bytes()).await?;
    out.flush().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(offset: f64, duration: f64, text: &str) -> WordTiming {
        WordTiming {
            offset,
            duration,
            text: text.to_string(),
        }
    }

    #[test]
    fn uniform_timings_cover_full_duration() {
        let script = "push through the pain and keep moving forward";
        let total = 12.6;
        let words = uniform_word_timings(script, total);
        assert_eq!(words.len(), 8);

        let sum: f64 = words.iter().map(|w| w.duration).sum();
        assert!((sum - total).abs() < 1e-9);

        let last = words.last().unwrap();
        assert!((last.offset + last.duration - total).abs() < 1e-9);
    }

    #[test]
    fn uniform_timings_empty_inputs() {
        assert!(uniform_word_timings("", 10.0).is_empty());
        assert!(uniform_word_timings("hello world", 0.0).is_empty());
    }

    #[test]
    fn cues_never_exceed_three_words() {
        let words = uniform_word_timings("one two three four five six seven", 7.0);
        let cues = group_cues(&words);
        for cue in &cues {
            assert!(cue.text.split_whitespace().count() <= 3);
        }
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[2].text, "seven");
    }

    #[test]
    fn punctuation_flushes_early() {
        let words = vec![
            word(0.0, 0.5, "Wake"),
            word(0.5, 0.5, "up."),
            word(1.0, 0.5, "Grind"),
            word(1.5, 0.5, "never"),
            word(2.0, 0.5, "stops"),
        ];
        let cues = group_cues(&words);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Wake up.");
        assert_eq!(cues[1].text, "Grind never stops");
    }

    #[test]
    fn trailing_pad_on_all_but_last_cue() {
        let words = vec![
            word(0.0, 0.4, "No"),
            word(0.4, 0.4, "excuses."),
            word(0.8, 0.4, "Ever."),
        ];
        let cues = group_cues(&words);
        assert_eq!(cues.len(), 2);
        assert!((cues[0].end - (0.8 + CUE_TAIL_PAD)).abs() < 1e-9);
        assert!((cues[1].end - 1.2).abs() < 1e-9);
    }

    #[test]
    fn cue_ends_strictly_after_start() {
        let words = vec![word(1.0, 0.0, "zero-length.")];
        let cues = group_cues(&words);
        assert_eq!(cues.len(), 1);
        assert!(cues[0].end > cues[0].start);

        let words = uniform_word_timings("a b c d e f g h i", 4.5);
        for cue in group_cues(&words) {
            assert!(cue.end > cue.start);
        }
    }

    #[test]
    fn cue_starts_increase_monotonically() {
        let words = uniform_word_timings(
            "Discipline beats motivation. Show up every single day and win",
            20.0,
        );
        let cues = group_cues(&words);
        for pair in cues.windows(2) {
            assert!(pair[1].start > pair[0].start);
        }
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(125.4), "00:02:05.400");
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(3599.999), "00:59:59.999");
        assert_eq!(format_timestamp(3661.5), "01:01:01.500");
    }

    #[test]
    fn rendered_file_shape() {
        let cues = vec![
            Cue {
                start: 0.0,
                end: 1.5,
                text: "Rise and grind".to_string(),
            },
            Cue {
                start: 1.5,
                end: 3.0,
                text: "every day".to_string(),
            },
        ];
        let rendered = render_cue_file(&cues);
        let expected = "1\n00:00:00.000 --> 00:00:01.500\nRise and grind\n\n\
                        2\n00:00:01.500 --> 00:00:03.000\nevery day\n\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn quoted_sentence_end_flushes() {
        assert!(ends_sentence("done.\""));
        assert!(ends_sentence("really?"));
        assert!(!ends_sentence("comma,"));
        assert!(!ends_sentence("word"));
    }
}
