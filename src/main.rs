use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use quantprep::{
    app::{App, Flow},
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    history::{
        sorted_by_timestamp, summarize, write_csv, HistoryStore, MemoryHistoryStore,
        SqliteHistoryStore,
    },
    question::{GenerationConfig, Operator},
    runtime::{CrosstermEventSource, QuizEventSource, Runner, ThreadScheduler},
    session::SessionController,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::{self, File, OpenOptions},
    io::{self, stdin},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 100;

/// timed mental math drills with per-user score history
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Two-minute mental math drills in the terminal. Answers are checked as you type, correct ones advance immediately, and every finished run is saved to your score history."
)]
pub struct Cli {
    /// username whose score history is tracked
    #[clap(short = 'u', long, global = true, value_parser = parse_username)]
    user: Option<String>,

    /// max integer digits for addition operands
    #[clap(long)]
    add_digits: Option<u32>,

    /// max decimal places for addition operands
    #[clap(long)]
    add_decimals: Option<u32>,

    /// max integer digits for subtraction operands
    #[clap(long)]
    sub_digits: Option<u32>,

    /// max decimal places for subtraction operands
    #[clap(long)]
    sub_decimals: Option<u32>,

    /// operators to practice, comma separated
    #[clap(long, value_enum, value_delimiter = ',')]
    ops: Option<Vec<Operator>>,

    /// remember the username and generation settings for next time
    #[clap(long)]
    save: bool,

    /// keep score history in memory only for this run
    #[clap(long)]
    no_history: bool,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// print score history, oldest first
    History {
        /// also export the history as CSV
        #[clap(long)]
        csv: Option<PathBuf>,
    },
}

fn parse_username(s: &str) -> Result<String, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Err("username must not be blank".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

impl Cli {
    /// Layer command-line overrides on top of the stored settings
    fn apply_overrides(&self, stored: Config) -> Config {
        let mut generation: GenerationConfig = stored.generation;
        if let Some(v) = self.add_digits {
            generation.addition_max_digits = v;
        }
        if let Some(v) = self.add_decimals {
            generation.addition_max_decimals = v;
        }
        if let Some(v) = self.sub_digits {
            generation.subtraction_max_digits = v;
        }
        if let Some(v) = self.sub_decimals {
            generation.subtraction_max_decimals = v;
        }
        if let Some(ops) = &self.ops {
            generation.enabled_operators = ops.iter().copied().collect();
        }

        let username = self
            .user
            .clone()
            .or_else(|| stored.username.filter(|u| !u.trim().is_empty()));

        Config {
            username,
            generation,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();

    let config_store = FileConfigStore::new();
    let config = cli.apply_overrides(config_store.load());
    let Some(username) = config.username.clone() else {
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::MissingRequiredArgument,
            "a username is required: pass --user NAME (add --save to remember it)",
        )
        .exit();
    };
    if cli.save {
        config_store.save(&config)?;
    }

    let (store, store_notice) = open_store(cli.no_history);

    if let Some(Command::History { csv }) = &cli.command {
        return print_history(&store, &username, csv.as_deref());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let generation = run_tui(username.clone(), config.generation, store, store_notice)?;

    if cli.save {
        config_store.save(&Config {
            username: Some(username),
            generation,
        })?;
    }

    Ok(())
}

fn init_logging() {
    let Some(path) = AppDirs::log_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    let filter =
        EnvFilter::try_from_env("QUANTPREP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    // the terminal belongs to the TUI, so logs only ever go to the file
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

/// The SQLite store, or an in-memory one with a notice when it cannot be used.
fn open_store(in_memory: bool) -> (Box<dyn HistoryStore>, Option<String>) {
    if in_memory {
        return (Box::new(MemoryHistoryStore::new()), None);
    }
    match SqliteHistoryStore::open_default() {
        Ok(store) => (Box::new(store), None),
        Err(e) => {
            tracing::warn!(error = %e, "history database unavailable, keeping scores in memory");
            (
                Box::new(MemoryHistoryStore::new()),
                Some(format!("History unavailable, scores kept for this run only: {e}")),
            )
        }
    }
}

fn print_history(
    store: &dyn HistoryStore,
    username: &str,
    csv: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let entries = sorted_by_timestamp(&store.read_all(username)?);

    match summarize(&entries) {
        None => {
            println!("No past sessions found.");
            println!("Try completing a mental math session!");
        }
        Some(summary) => {
            for (i, entry) in entries.iter().enumerate() {
                println!("Attempt #{:<4} {}  {:>4}", i + 1, entry.timestamp, entry.score);
            }
            println!(
                "{} sessions, best {}, mean {:.1}",
                summary.sessions, summary.best, summary.mean
            );
        }
    }

    if let Some(path) = csv {
        write_csv(&entries, File::create(path)?)?;
        println!("Exported {} sessions to {}", entries.len(), path.display());
    }

    Ok(())
}

fn run_tui(
    username: String,
    generation: GenerationConfig,
    store: Box<dyn HistoryStore>,
    notice: Option<String>,
) -> Result<GenerationConfig, Box<dyn Error>> {
    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (events, tx) = CrosstermEventSource::new();
    let controller =
        SessionController::new(username, store, Box::new(ThreadScheduler::new(tx)))
            .with_config(generation);
    let mut app = App::new(controller);
    app.notice = notice;

    let runner = Runner::new(events, Duration::from_millis(POLL_INTERVAL_MS));
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result?;
    Ok(app.controller.config().clone())
}

fn start_tui<B: Backend, S: HistoryStore, E: QuizEventSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
    runner: &Runner<E>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| f.render_widget(&*app, f.area()))?;

        if let Some(event) = runner.step() {
            if app.handle_event(event) == Flow::Quit {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use quantprep::history::HistoryEntry;
    use quantprep::runtime::{ManualScheduler, QuizEvent, TestEventSource};
    use ratatui::backend::TestBackend;
    use std::sync::mpsc;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["quantprep"]);

        assert_eq!(cli.user, None);
        assert_eq!(cli.add_digits, None);
        assert_eq!(cli.ops, None);
        assert!(!cli.save);
        assert!(!cli.no_history);
        assert_eq!(cli.command, None);
    }

    #[test]
    fn test_cli_user_is_trimmed() {
        let cli = Cli::parse_from(["quantprep", "-u", "  alice "]);
        assert_eq!(cli.user.as_deref(), Some("alice"));

        let cli = Cli::parse_from(["quantprep", "--user", "bob"]);
        assert_eq!(cli.user.as_deref(), Some("bob"));
    }

    #[test]
    fn test_cli_blank_user_rejected() {
        assert!(Cli::try_parse_from(["quantprep", "--user", "   "]).is_err());
    }

    #[test]
    fn test_cli_ops_list() {
        let cli = Cli::parse_from(["quantprep", "--ops", "add,div"]);
        assert_eq!(cli.ops, Some(vec![Operator::Add, Operator::Div]));

        assert!(Cli::try_parse_from(["quantprep", "--ops", "pow"]).is_err());
    }

    #[test]
    fn test_cli_history_subcommand_takes_global_user() {
        let cli = Cli::parse_from(["quantprep", "history", "--user", "dana", "--csv", "out.csv"]);

        assert_eq!(cli.user.as_deref(), Some("dana"));
        assert_eq!(
            cli.command,
            Some(Command::History {
                csv: Some(PathBuf::from("out.csv"))
            })
        );
    }

    #[test]
    fn test_apply_overrides_layers_cli_on_stored() {
        let stored = Config {
            username: Some("stored".into()),
            generation: GenerationConfig::default(),
        };
        let cli = Cli::parse_from([
            "quantprep",
            "--add-digits",
            "4",
            "--sub-decimals",
            "0",
            "--ops",
            "sub",
        ]);

        let config = cli.apply_overrides(stored);

        assert_eq!(config.username.as_deref(), Some("stored"));
        assert_eq!(config.generation.addition_max_digits, 4);
        assert_eq!(config.generation.addition_max_decimals, 2);
        assert_eq!(config.generation.subtraction_max_decimals, 0);
        assert_eq!(
            config.generation.enabled_operators,
            [Operator::Sub].into_iter().collect()
        );
    }

    #[test]
    fn test_apply_overrides_prefers_cli_user_and_drops_blank_stored() {
        let cli = Cli::parse_from(["quantprep", "-u", "eve"]);
        let config = cli.apply_overrides(Config {
            username: Some("stored".into()),
            ..Config::default()
        });
        assert_eq!(config.username.as_deref(), Some("eve"));

        let cli = Cli::parse_from(["quantprep"]);
        let config = cli.apply_overrides(Config {
            username: Some("  ".into()),
            ..Config::default()
        });
        assert_eq!(config.username, None);
    }

    #[test]
    fn test_print_history_with_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut store = MemoryHistoryStore::new();
        store
            .append("alice", &HistoryEntry::new("2024-01-02T00:00:00.000Z", 6))
            .unwrap();
        store
            .append("alice", &HistoryEntry::new("2024-01-01T00:00:00.000Z", 2))
            .unwrap();

        print_history(&store, "alice", Some(&path)).unwrap();

        let csv = fs::read_to_string(&path).unwrap();
        assert!(csv.starts_with("attempt,timestamp,score\n1,2024-01-01T00:00:00.000Z,2\n"));
    }

    #[test]
    fn test_open_store_in_memory() {
        let (store, notice) = open_store(true);
        assert!(store.read_all("anyone").unwrap().is_empty());
        assert!(notice.is_none());
    }

    #[test]
    fn test_start_tui_quits_on_escape() {
        use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        let controller = SessionController::new(
            "alice",
            MemoryHistoryStore::new(),
            Box::new(ManualScheduler::new()),
        );
        let mut app = App::new(controller);

        let (tx, rx) = mpsc::channel();
        tx.send(QuizEvent::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)))
            .unwrap();
        tx.send(QuizEvent::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)))
            .unwrap();
        tx.send(QuizEvent::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)))
            .unwrap();
        let runner = Runner::new(TestEventSource::new(rx), Duration::from_millis(5));

        start_tui(&mut terminal, &mut app, &runner).unwrap();

        assert!(!app.controller.is_running());
    }
}
