// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dex_tracker::{logging, open_tracker, CatalogEntry, EntryId, Notice, TrackerConfig, View};
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "dex-tracker", version, about = "Track a personal list of Pokémon")]
struct Cli {
    /// Directory holding tracker.db and the log file (overrides DEX_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Catalog API base URL (overrides DEX_API_BASE_URL)
    #[arg(long, global = true)]
    api_base_url: Option<String>,

    /// Per-request timeout in seconds (overrides DEX_REQUEST_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Re-fetch every tracked entry after a successful add
    #[arg(long, global = true)]
    refresh_on_add: bool,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive terminal UI (default)
    Ui,
    #[command(flatten)]
    Command(Command),
}

#[derive(Subcommand)]
enum Command {
    /// Refresh and print every tracked entry
    List {
        /// Print the cached entries without contacting the API
        #[arg(long)]
        offline: bool,
    },
    /// Print the full detail of one cached entry
    Show { id: EntryId },
    /// Look up a Pokémon by name and start tracking it
    Add { name: String },
    /// Stop tracking an entry
    Remove { id: EntryId },
    /// Re-fetch every tracked entry
    Refresh,
    /// Show the audit log of adds and removes
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let rt = Runtime::new().context("Failed to start async runtime")?;

    match cli.command.unwrap_or(Mode::Ui) {
        Mode::Ui => run_ui_mode(&config, &rt),
        Mode::Command(command) => {
            logging::init_stderr();
            run_command(command, &config, &rt)
        }
    }
}

fn build_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = TrackerConfig::from_env()?;

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(url) = &cli.api_base_url {
        config.api_base_url = url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        if secs == 0 {
            bail!("--timeout-secs must be at least 1");
        }
        config.request_timeout = Duration::from_secs(secs);
    }
    if cli.refresh_on_add {
        config.refresh_on_add = true;
    }

    Ok(config)
}

fn run_command(command: Command, config: &TrackerConfig, rt: &Runtime) -> Result<()> {
    let mut tracker = open_tracker(config, "cli")?;

    match command {
        Command::List { offline } => {
            if !offline {
                if let Err(e) = rt.block_on(tracker.mount()) {
                    print_notice(&Notice::refresh_failed(&e));
                    eprintln!("   {}", e);
                }
            }

            match tracker.view() {
                View::Blocked(_) => std::process::exit(1),
                View::Loading | View::Entries { .. } => print_list(tracker.cache().entries()),
            }
        }
        Command::Show { id } => match tracker.select(id) {
            Some(entry) => print_detail(entry, &config.cry_base_url),
            None => {
                eprintln!("❌ #{} is not in the local cache", id);
                eprintln!("   Run: dex-tracker refresh");
                std::process::exit(1);
            }
        },
        Command::Add { name } => {
            let result = rt.block_on(tracker.add_by_name(&name));
            print_notice(&Notice::from_add_result(&result));

            match result {
                Ok(entry) => println!("✓ Tracking #{} ({} total)", entry.id, tracker.ids().len()),
                Err(e) if e.already_tracked_id().is_some() => {}
                Err(e) => {
                    eprintln!("   {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Remove { id } => {
            if tracker.remove(id) {
                print_notice(&Notice::removed());
            } else {
                println!("#{} was not tracked, nothing to do", id);
            }
        }
        Command::Refresh => match rt.block_on(tracker.refresh_all()) {
            Ok(cache) => println!("✓ Refreshed {} entries", cache.len()),
            Err(e) => {
                print_notice(&Notice::refresh_failed(&e));
                eprintln!("   {}", e);
                std::process::exit(1);
            }
        },
        Command::History { limit } => {
            let events = tracker.store().recent_events(limit)?;
            if events.is_empty() {
                println!("No changes recorded yet");
            }
            for event in events {
                println!(
                    "{}  {:<16} #{:<5} {:<12} by {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.entity_id,
                    event.data["name"].as_str().unwrap_or("-"),
                    event.actor
                );
            }
        }
    }

    Ok(())
}

fn print_notice(notice: &Notice) {
    let marker = if notice.is_destructive() { "❌" } else { "✅" };
    println!("{} {}: {}", marker, notice.title, notice.description);
}

fn print_list(entries: &[CatalogEntry]) {
    if entries.is_empty() {
        println!("No Pokémon tracked. Add one with: dex-tracker add <name>");
        return;
    }

    println!(
        "{:<6} {:<16} {:>8} {:>9} {:>9}  {}",
        "#", "Name", "Height", "Weight", "Base Exp", "Types"
    );
    for entry in entries {
        println!(
            "{:<6} {:<16} {:>7}m {:>7}kg {:>9}  {}",
            entry.id,
            entry.name,
            entry.height_m(),
            entry.weight_kg(),
            entry
                .base_experience
                .map(|xp| xp.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.type_names().join(", ")
        );
    }
}

fn print_detail(entry: &CatalogEntry, cry_base_url: &str) {
    println!("#{} {}", entry.id, entry.name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Types:   {}", entry.type_names().join(", "));
    println!("Height:  {}m", entry.height_m());
    println!("Weight:  {}kg", entry.weight_kg());
    if let Some(xp) = entry.base_experience {
        println!("Base XP: {}", xp);
    }
    println!("Cry:     {}", entry.cry_url(cry_base_url));

    println!("\nSprites");
    for (label, url) in entry.sprites.gallery() {
        println!("  {:<20} {}", label, url);
    }

    println!("\nAbilities");
    for slot in &entry.abilities {
        let hidden = if slot.is_hidden { " (Hidden)" } else { "" };
        println!("  • {}{}", slot.ability.name, hidden);
    }

    println!("\nStats");
    for stat in &entry.stats {
        let filled = (stat.fraction() * 20.0).round() as usize;
        println!(
            "  {:<16} {:<20} {}",
            stat.stat.name,
            "█".repeat(filled),
            stat.base_stat
        );
    }

    println!("\nMoves");
    let (moves, remaining) = entry.move_preview(dex_tracker::MOVE_PREVIEW_LIMIT);
    let names: Vec<&str> = moves.iter().map(|m| m.learned.name.as_str()).collect();
    println!("  {}", names.join(", "));
    if remaining > 0 {
        println!("  And {} more moves...", remaining);
    }
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &TrackerConfig, rt: &Runtime) -> Result<()> {
    logging::init_file(&config.log_path())?;

    println!("🖥️  Loading Pokémon tracker UI...\n");
    let tracker = open_tracker(config, "tui")?;
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(tracker, config.cry_base_url.clone());
    ui::run_ui(&mut app, rt.handle())?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &TrackerConfig, _rt: &Runtime) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web UI: cargo run --bin dex-server --features server");
    std::process::exit(1);
}
