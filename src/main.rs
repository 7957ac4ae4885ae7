use anyhow::Result;
use clap::{Parser, Subcommand};

use clip_factory::api::sheets::{Account, SheetsClient};
use clip_factory::config::Config;
use clip_factory::generator;
use clip_factory::init;
use clip_factory::request::{VideoRequest, DEFAULT_CLIPS};

#[derive(Parser)]
#[command(name = "clip-factory")]
#[command(about = "Short-form video factory: script, narration, footage, captions, render")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage the Accounts worksheet
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
    /// Show the posting History worksheet
    History,
    /// Generate one video
    Generate {
        /// What the narration is about.
        #[arg(long)]
        topic: String,
        /// Footage keyword; repeat for multiple vibes.
        #[arg(long = "vibe")]
        vibes: Vec<String>,
        /// Narration voice override.
        #[arg(long)]
        voice: Option<String>,
        /// Burn captions into the frames.
        #[arg(long)]
        captions: bool,
        #[arg(long, default_value_t = DEFAULT_CLIPS)]
        clips: u32,
    },
    /// Delete all run artifacts
    Clean,
}

#[derive(Subcommand)]
enum AccountsAction {
    List,
    Add {
        #[arg(long)]
        platform: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        niche: String,
        #[arg(long, default_value = "Active")]
        status: String,
    },
}

fn sheet_store(cfg: &Config) -> Result<SheetsClient> {
    if !cfg.has_sheet_store() {
        anyhow::bail!(
            "spreadsheet_id and sheets_access_token must be set in the config to use the sheet store"
        );
    }
    Ok(SheetsClient::new(
        reqwest::Client::new(),
        &cfg.spreadsheet_id,
        &cfg.sheets_token,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;

    init::ensure_directories().await?;

    match cli.command {
        Command::Accounts { action } => match action {
            AccountsAction::List => {
                let store = sheet_store(&cfg)?;
                let accounts = store.list_accounts().await?;
                if accounts.is_empty() {
                    println!("No accounts added yet.");
                } else {
                    println!("{:<16} {:<24} {:<8} NICHE", "PLATFORM", "USERNAME", "STATUS");
                    for account in accounts {
                        println!(
                            "{:<16} {:<24} {:<8} {}",
                            account.platform, account.username, account.status, account.niche
                        );
                    }
                }
            }
            AccountsAction::Add {
                platform,
                username,
                niche,
                status,
            } => {
                let store = sheet_store(&cfg)?;
                let account = Account {
                    platform: platform.clone(),
                    username: username.clone(),
                    status,
                    niche,
                };
                store.add_account(&account).await?;
                println!("Added {} on {}.", username, platform);
            }
        },
        Command::History => {
            let store = sheet_store(&cfg)?;
            let rows = store.list_history().await?;
            if rows.is_empty() {
                println!("No history found.");
            } else {
                for row in rows {
                    println!("{}", row.join(" | "));
                }
            }
        }
        Command::Generate {
            topic,
            vibes,
            voice,
            captions,
            clips,
        } => {
            if !init::check_ffmpeg().await {
                eprintln!("[WARNING] FFmpeg not found in PATH. Please install FFmpeg.");
            }

            let mut request = VideoRequest::new(topic);
            request.vibes = vibes;
            request.voice = voice;
            request.captions = captions;
            request.clip_count = clips;

            match generator::run_generation(&cfg, &request).await {
                Ok(rendered) => {
                    println!("run:       {}", rendered.run_id);
                    println!("video:     {}", rendered.video.display());
                    println!("script:    {}", rendered.script.display());
                    if let Some(srt) = &rendered.subtitles {
                        println!("subtitles: {}", srt.display());
                    }
                    println!("duration:  {:.2}s", rendered.duration);
                }
                Err(err) => {
                    eprintln!("[ERROR] {}", err);
                    std::process::exit(1);
                }
            }
        }
        Command::Clean => {
            let removed = generator::clear_runs_dir(&cfg).await?;
            println!("Removed {} entries from {}/.", removed, cfg.runs_dir);
        }
    }

    Ok(())
}
