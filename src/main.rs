use std::fs::File;
use std::io::{self, Read, Write, stdout};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};
use tempfile::NamedTempFile;

use pageflow::book::{OpenedBook, open_book};
use pageflow::bookmark::{ReadingState, STATE_FILENAME, SavedPosition};
use pageflow::event_source::KeyboardEventSource;
use pageflow::panic_handler::initialize_panic_handler;
use pageflow::settings;
use pageflow::{BookContext, Pager, ReaderSession, Viewer, Viewport, run_viewer};

/// Read EPUB books and XHTML files in the terminal.
#[derive(Parser, Debug)]
#[command(name = "pageflow", version, about)]
struct Cli {
    /// EPUB or XHTML file; `-` reads it from standard input
    path: Option<String>,

    /// Treat the input as a single XHTML document
    #[arg(long)]
    html: bool,

    /// Start at this item (1-based, reading order)
    #[arg(short, long, value_name = "N")]
    item: Option<usize>,

    /// Start at the item with this reference; other references are opened
    /// with the system viewer
    #[arg(short = 'p', long = "path", value_name = "REF")]
    start_path: Option<String>,

    /// Print the item references and exit
    #[arg(short, long)]
    list: bool,

    /// Print the book metadata and exit
    #[arg(short, long)]
    metadata: bool,

    /// Open the cover image with the system viewer and exit
    #[arg(long)]
    cover: bool,

    /// Continue where the last session stopped
    #[arg(long)]
    resume: bool,

    /// Print saved bookmarks and exit
    #[arg(long)]
    bookmarks: bool,

    /// Open saved bookmark N (as numbered by --bookmarks)
    #[arg(long, value_name = "N")]
    bookmark: Option<usize>,

    /// Delete saved bookmark N and exit
    #[arg(long, value_name = "N")]
    delete_bookmark: Option<usize>,

    #[arg(long, value_name = "FILE", default_value = "pageflow.log")]
    log_file: PathBuf,

    /// off, error, warn, info, debug or trace
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// What to open and where to start.
struct Target {
    path: PathBuf,
    html: bool,
    saved: Option<SavedPosition>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = settings::load_settings();
    let settings = settings::current();
    init_logging(&cli, settings.log_level.as_deref())?;
    info!("Starting pageflow");
    loaded.log();

    let state_path = settings::config_dir().map(|dir| dir.join(STATE_FILENAME));
    let mut state = ReadingState::load_or_ephemeral(state_path.as_deref());

    if cli.bookmarks {
        print_bookmarks(&state);
        return Ok(());
    }
    if let Some(n) = cli.delete_bookmark {
        let removed = state
            .remove_bookmark(n.wrapping_sub(1))
            .with_context(|| format!("No bookmark {n}"))?;
        println!("Deleted {}", removed.describe());
        return Ok(());
    }

    // keeps a stdin copy alive until the reader exits
    let mut stdin_copy = None;
    let target = resolve_target(&cli, &state, &mut stdin_copy)?;
    let mut book = open_book(&target.path, target.html)?;

    if cli.cover {
        book.open_cover()?;
        return Ok(());
    }
    if cli.metadata {
        book.info.describe().iter().for_each(|line| println!("{line}"));
        return Ok(());
    }
    if cli.list {
        book.items.iter().for_each(|item| println!("{item}"));
        return Ok(());
    }

    let OpenedBook {
        info,
        items,
        is_html,
        opener,
        mut external,
    } = book;

    let (start, cursor) = match start_position(&cli, &items, target.saved.as_ref())? {
        Start::Item(index, cursor) => (index, cursor),
        Start::External(reference) => {
            external.open_external(&reference)?;
            return Ok(());
        }
    };

    let pager = Pager::new(items, opener, Viewport::new(80, 24))?;
    let mut session =
        ReaderSession::new(pager, external).with_status_duration(settings.status_duration());
    session.open_at(start, cursor)?;

    let context = BookContext {
        title: info.title,
        file_path: target.path.to_string_lossy().into_owned(),
        is_html,
    };
    let mut viewer = Viewer::new(session, context, state)
        .with_margins(settings.margin, settings.right_margin);

    initialize_panic_handler();
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let res = run_viewer(&mut terminal, &mut viewer, &mut KeyboardEventSource);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {err:?}");
        eprintln!("{err:?}");
    }

    drop(stdin_copy);
    info!("Shutting down pageflow");
    Ok(())
}

fn init_logging(cli: &Cli, configured: Option<&str>) -> Result<()> {
    let level = match cli.log_level.as_deref().or(configured) {
        Some(level) => level
            .parse::<LevelFilter>()
            .with_context(|| format!("Unknown log level {level}"))?,
        None => LevelFilter::Info,
    };
    let file = File::create(&cli.log_file)
        .with_context(|| format!("Cannot create log file {:?}", cli.log_file))?;
    WriteLogger::init(level, Config::default(), file)?;
    Ok(())
}

fn print_bookmarks(state: &ReadingState) {
    if state.bookmarks.is_empty() {
        println!("No bookmarks");
    }
    for (i, bookmark) in state.bookmarks.iter().enumerate() {
        println!("{:>3}  {}", i + 1, bookmark.describe());
    }
}

fn resolve_target(
    cli: &Cli,
    state: &ReadingState,
    stdin_copy: &mut Option<NamedTempFile>,
) -> Result<Target> {
    if let Some(path) = &cli.path {
        if path == "-" {
            let (copy, looks_like_zip) = copy_stdin()?;
            let target = Target {
                path: copy.path().to_path_buf(),
                html: cli.html || !looks_like_zip,
                saved: None,
            };
            *stdin_copy = Some(copy);
            return Ok(target);
        }
        let path = std::fs::canonicalize(path).with_context(|| format!("Cannot find {path}"))?;
        let saved = state
            .last_read
            .as_ref()
            .filter(|saved| cli.resume && Path::new(&saved.file_path) == path.as_path())
            .cloned();
        return Ok(Target {
            path,
            html: cli.html,
            saved,
        });
    }

    let saved = match cli.bookmark {
        Some(n) => state
            .bookmarks
            .get(n.wrapping_sub(1))
            .cloned()
            .with_context(|| format!("No bookmark {n}"))?,
        None => match &state.last_read {
            Some(saved) => saved.clone(),
            None => bail!("No file given and nothing to resume"),
        },
    };
    Ok(Target {
        path: PathBuf::from(&saved.file_path),
        html: cli.html || saved.is_html,
        saved: Some(saved),
    })
}

/// Copies standard input into a temp file, reporting whether it starts with
/// the zip signature.
fn copy_stdin() -> Result<(NamedTempFile, bool)> {
    let mut bytes = Vec::new();
    io::stdin()
        .read_to_end(&mut bytes)
        .context("Failed to read standard input")?;
    let mut file = NamedTempFile::new().context("Failed to create temp file")?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok((file, bytes.starts_with(b"PK\x03\x04")))
}

enum Start {
    Item(usize, usize),
    External(String),
}

fn start_position(cli: &Cli, items: &[String], saved: Option<&SavedPosition>) -> Result<Start> {
    if let Some(n) = cli.item {
        if n == 0 || n > items.len() {
            bail!("Item {n} out of range (1-{})", items.len());
        }
        return Ok(Start::Item(n - 1, 0));
    }
    if let Some(reference) = &cli.start_path {
        return Ok(match items.iter().position(|item| item == reference) {
            Some(index) => Start::Item(index, 0),
            None => Start::External(reference.clone()),
        });
    }
    if let Some(saved) = saved {
        if let Some(index) = items.iter().position(|item| *item == saved.item) {
            return Ok(Start::Item(index, saved.cursor));
        }
        info!("Saved item {} no longer in book", saved.item);
    }
    Ok(Start::Item(0, 0))
}
