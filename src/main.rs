#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{Level as TraceLevel, info, warn};
use tracing_subscriber::FmtSubscriber;

use prompt_fold::config::{FileStore, FoldingMode, ProfileStore};
use prompt_fold::constants::defaults;
use prompt_fold::host::{
    HostPage, ListNode, PollConfig, Prompt, PromptEntry, PromptManagerPanel, PromptOrderEntry,
    StaticPromptManager,
};
use prompt_fold::settings::{Confirm, NoticeLevel, Notifier};
use prompt_fold::{FoldingEngine, FoldingSession};

#[derive(Parser)]
#[command(name = "prompt-fold")]
#[command(version)]
#[command(about = "Fold flat prompt lists into collapsible groups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage file (defaults to <config dir>/prompt-fold/storage.json)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Profile to operate on
    #[arg(short, long, global = true, default_value = defaults::PROFILE)]
    profile: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List profiles with saved configuration
    Profiles,
    /// Print the profile's configuration as JSON
    Show,
    /// Group the entries of a JSON file and print the layout
    Fold { entries: PathBuf },
    /// Print the identifiers left after removing children of disabled groups
    Filter { entries: PathBuf },
    /// Replace the divider patterns
    SetDividers {
        #[arg(required = true)]
        patterns: Vec<String>,
        /// Match dividers case-sensitively
        #[arg(long)]
        case_sensitive: bool,
    },
    /// Change the folding mode (standard, sandwich, manual)
    SetMode { mode: FoldingMode },
    /// Turn folding on or off
    Toggle,
    /// Designate manual headers by entry identifier
    Headers { identifiers: Vec<String> },
    /// Switch verbose engine diagnostics
    Debug { state: Switch },
    /// Restore default dividers, case sensitivity and mode
    Reset {
        #[arg(short, long)]
        yes: bool,
    },
    /// Copy mode, dividers and manual headers from another profile
    CopyFrom {
        source: String,
        /// Current entries to resolve the headers against
        entries: PathBuf,
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

/// Prints toasts to the terminal
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success | NoticeLevel::Info => println!("{message}"),
            NoticeLevel::Warning => eprintln!("warning: {message}"),
            NoticeLevel::Error => eprintln!("error: {message}"),
        }
    }
}

/// Asks on stdin unless `--yes` was given
struct StdinConfirm {
    assume_yes: bool,
}

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        ask(question, &mut io::stdout(), &mut io::stdin().lock())
    }
}

/// Show the question and read one answer; anything but y/yes means no
fn ask(question: &str, output: &mut impl Write, input: &mut impl BufRead) -> bool {
    if let Err(e) = write!(output, "{question} [y/N] ").and_then(|()| output.flush()) {
        warn!(error = %e, "Failed to show confirmation prompt");
    }
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(e) => {
            warn!(error = %e, "Failed to read confirmation answer");
            false
        }
    }
}

fn init_logging() -> Result<()> {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<PromptEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read entries file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse entries file: {}", path.display()))
}

fn page_with(entries: Vec<PromptEntry>) -> HostPage {
    HostPage::with_panel(PromptManagerPanel::with_entries(entries))
}

fn print_layout(page: &HostPage) {
    let Some(list) = page.list() else {
        return;
    };
    for node in list.nodes() {
        match node {
            ListNode::Entry(entry) => println!("  {} ({})", entry.name, entry.identifier),
            ListNode::Group(group) => {
                let marker = if group.open { "▼" } else { "▶" };
                let state = if group.header.enabled { "" } else { " [disabled]" };
                println!(
                    "{marker} {} ({}){state} - {} entries",
                    group.header.name,
                    group.key,
                    group.content.len()
                );
                for child in &group.content {
                    println!("    {} ({})", child.name, child.identifier);
                }
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let file_store = match &cli.store {
        Some(path) => FileStore::open(path),
        None => FileStore::open_default(),
    };
    info!(path = %file_store.path().display(), profile = %cli.profile, "Using storage");

    let engine = FoldingEngine::new(ProfileStore::new(file_store), &cli.profile);
    let mut session = FoldingSession::new(engine);
    let mut notifier = ConsoleNotifier;
    let now = Instant::now();

    match cli.command {
        Commands::Profiles => {
            for profile in session.profiles() {
                let marker = if profile == cli.profile { "*" } else { " " };
                println!("{marker} {profile}");
            }
        }
        Commands::Show => {
            let config = session.engine().config();
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        Commands::Fold { entries } => {
            let mut page = page_with(read_entries(&entries)?);
            if !session.start(&mut page) {
                bail!("Could not attach to the prompt list");
            }
            print_layout(&page);
        }
        Commands::Filter { entries } => {
            let entries = read_entries(&entries)?;
            let prompts = entries
                .iter()
                .map(|e| Prompt {
                    identifier: e.identifier.clone(),
                    name: e.name.clone(),
                })
                .collect();
            let order = entries
                .iter()
                .map(|e| PromptOrderEntry {
                    identifier: e.identifier.clone(),
                    enabled: e.enabled,
                })
                .collect();

            let mut page = page_with(entries);
            session.start(&mut page);
            session
                .attach_manager(
                    Box::new(StaticPromptManager::new(prompts, Some(order))),
                    PollConfig::default(),
                )
                .await
                .context("Failed to attach to the prompt manager")?;

            if let Some(manager) = session.manager() {
                for identifier in manager.get_prompt_collection("normal").identifiers() {
                    println!("{identifier}");
                }
            }
        }
        Commands::SetDividers {
            patterns,
            case_sensitive,
        } => {
            let mode = session.engine().config().folding_mode;
            let mut page = HostPage::new();
            if !session.apply_settings(&mut page, &patterns.join("\n"), case_sensitive, mode, &mut notifier, now) {
                bail!("Dividers were not saved");
            }
        }
        Commands::SetMode { mode } => {
            session.change_mode(&mut HostPage::new(), mode, &mut notifier, now);
        }
        Commands::Toggle => {
            let enabled = !session.engine().config().feature_enabled;
            session
                .engine_mut()
                .set_feature_enabled(enabled)
                .context("Failed to save feature flag")?;
            println!("Prompt folding {}", if enabled { "enabled" } else { "disabled" });
        }
        Commands::Headers { identifiers } => {
            let headers: BTreeSet<String> = identifiers.into_iter().collect();
            let count = headers.len();
            session
                .engine_mut()
                .set_manual_headers(headers)
                .context("Failed to save manual headers")?;
            println!("Saved {count} manual headers");
        }
        Commands::Debug { state } => {
            let debug = matches!(state, Switch::On);
            session
                .engine_mut()
                .set_debug(debug)
                .context("Failed to save debug flag")?;
            println!("Debug logging {}", if debug { "on" } else { "off" });
        }
        Commands::Reset { yes } => {
            let mut confirm = StdinConfirm { assume_yes: yes };
            session.reset_to_defaults(&mut HostPage::new(), &mut confirm, &mut notifier, now);
        }
        Commands::CopyFrom { source, entries, yes } => {
            let mut page = page_with(read_entries(&entries)?);
            session.start(&mut page);
            let mut confirm = StdinConfirm { assume_yes: yes };
            if let Some(report) = session.copy_from_profile(&mut page, &source, &mut confirm, &mut notifier, now) {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_ask_reads_answer_when_prompt_cannot_be_shown() {
        assert!(ask("Reset?", &mut BrokenPipe, &mut &b"yes\n"[..]));
    }

    #[test]
    fn test_ask_defaults_to_no() {
        let mut shown = Vec::new();
        assert!(!ask("Reset?", &mut shown, &mut &b"\n"[..]));
        assert!(!ask("Reset?", &mut Vec::new(), &mut &b""[..]));
        assert_eq!(String::from_utf8(shown).unwrap(), "Reset? [y/N] ");
    }
}
