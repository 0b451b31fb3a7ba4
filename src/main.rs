mod adapters;
mod dom;
mod errors;
mod markup;
mod overlay;
mod page;
mod prefs;
mod segment;
mod settings;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use adapters::Registry;
use overlay::{Activation, Controller};
use page::Source;
use prefs::{ColumnPreference, Preferences, SqliteStore};
use segment::BlockKind;
use settings::Settings;

#[derive(Parser)]
#[command(name = "playmode", about = "Distraction-free play mode for guitar tab pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct PageArgs {
    /// Address of the song page
    #[arg(long)]
    url: String,
    /// Read the page from a saved HTML file instead of fetching it
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Viewport width in pixels (default from settings)
    #[arg(short, long)]
    width: Option<u32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether a page is supported
    Check {
        #[arg(long)]
        url: String,
    },
    /// Activate play mode and write the overlay as an HTML page
    Play {
        #[command(flatten)]
        page: PageArgs,
        /// Output file (default: stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the blocks of a page
    Blocks {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Hide blocks by id (as clicking them in edit mode would)
    Hide {
        #[command(flatten)]
        page: PageArgs,
        ids: Vec<usize>,
    },
    /// Show every hidden block of a page again
    Restore {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Set the default column layout (auto, 2, 3 or 4)
    Columns { value: ColumnPreference },
    /// Show stored preferences
    Stats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;

    match cli.command {
        Commands::Check { url } => {
            let controller = open_controller(&settings)?;
            println!("{}", serde_json::to_string(&controller.check_support(&url))?);
            Ok(())
        }
        Commands::Play { page, out } => {
            let mut controller = activated(&mut settings, &page).await?;
            let Some(html) = controller.render_document(&page.url) else {
                return Ok(());
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, html)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "Wrote {} ({} blocks, {} columns)",
                        path.display(),
                        controller.blocks().len(),
                        controller.state().column_count
                    );
                }
                None => print!("{}", html),
            }
            controller.close();
            Ok(())
        }
        Commands::Blocks { page } => {
            let controller = activated(&mut settings, &page).await?;
            let blocks = controller.blocks();
            if blocks.is_empty() {
                println!("No blocks.");
                return Ok(());
            }
            println!("{:>3} | {:<8} | {:<6} | {}", "id", "kind", "hidden", "preview");
            println!("{}", "-".repeat(72));
            for b in &blocks {
                let kind = match b.kind {
                    BlockKind::Verbatim => "block".to_string(),
                    BlockKind::Lines(n) => format!("{} lines", n),
                };
                let text = b.element.text_content();
                let preview = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                println!(
                    "{:>3} | {:<8} | {:<6} | {}",
                    b.id,
                    kind,
                    if b.hidden() { "yes" } else { "" },
                    truncate(preview.trim(), 48)
                );
            }
            println!("\n{} blocks, {} hidden", blocks.len(), controller.hidden().len());
            Ok(())
        }
        Commands::Hide { page, ids } => {
            let mut controller = activated(&mut settings, &page).await?;
            controller.toggle_edit();
            for id in ids {
                if !controller.click_block(id).await {
                    println!("No block {}", id);
                }
            }
            controller.close();
            println!("Hidden: {:?}", controller.hidden());
            Ok(())
        }
        Commands::Restore { page } => {
            let mut controller = activated(&mut settings, &page).await?;
            controller.toggle_edit();
            controller.restore_all().await;
            controller.close();
            println!("All blocks restored for {}", page.url);
            Ok(())
        }
        Commands::Columns { value } => {
            let prefs = Preferences::new(SqliteStore::open(&settings.db_path)?);
            prefs.set_columns(value).await?;
            println!("Default columns: {}", value);
            Ok(())
        }
        Commands::Stats => {
            let prefs = Preferences::new(SqliteStore::open(&settings.db_path)?);
            println!("Database:        {}", settings.db_path);
            println!("Stored keys:     {}", prefs.store().entries()?.len());
            println!("Default columns: {}", prefs.columns().await);
            let map = prefs.hidden_map().await;
            println!("Pages:           {}", map.len());
            for (url, ids) in &map {
                println!("  {} -> {:?}", truncate(url, 60), ids);
            }
            Ok(())
        }
    }
}

fn open_controller(settings: &Settings) -> Result<Controller<SqliteStore>> {
    let store = SqliteStore::open(&settings.db_path)
        .with_context(|| format!("Failed to open preferences at {}", settings.db_path))?;
    Ok(Controller::new(Registry::default(), Preferences::new(store), settings))
}

async fn activated(settings: &mut Settings, page: &PageArgs) -> Result<Controller<SqliteStore>> {
    if let Some(width) = page.width {
        settings.viewport_width = width;
    }
    let mut controller = open_controller(settings)?;
    let source = Source::new(&page.url, page.file.clone());

    // Ctrl-C while waiting for content stops the retry loop cleanly.
    let token = controller.cancel_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    let outcome = controller.activate(&source).await;
    interrupt.abort();

    match outcome? {
        Activation::Activated { adapter, blocks } => {
            info!(adapter, blocks, "activated");
        }
        Activation::Cancelled => bail!("Interrupted before the song content loaded"),
        Activation::AlreadyActive => {}
    }
    Ok(controller)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}
