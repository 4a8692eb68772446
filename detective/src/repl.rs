//! Line-oriented console.
//!
//! One command runs to completion before the next line is read; lines typed
//! meanwhile wait in the stdin buffer. Ctrl-C cancels a pending request, or
//! leaves the game when idle.

use detective_core::handlers::welcome;
use detective_core::{
    Action, AppConfig, Dispatcher, FileStorage, Frame, Generator, HttpGenerator, MemoryStorage,
    OfflineGenerator, OutputSink, SessionStore, Storage, StreamingCoordinator, SystemClock,
};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Width blanked out by a `ClearLine` frame.
const LINE_WIDTH: usize = 80;

/// Renders frames to stdout.
struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn emit(&self, frame: Frame) {
        let mut out = io::stdout().lock();
        let _ = match frame {
            Frame::Banner(text) => writeln!(out, "{text}"),
            Frame::Filler(text) => write!(out, "\r{text:<LINE_WIDTH$}"),
            Frame::ClearLine => write!(out, "\r{:LINE_WIDTH$}\r", ""),
            Frame::Content(text) => write!(out, "{text}"),
        };
        let _ = out.flush();
    }
}

fn open_store(config: &AppConfig) -> SessionStore {
    let storage: Box<dyn Storage> = match (&config.data_dir, config.persist) {
        (Some(dir), true) => {
            info!(dir = %dir.display(), "Using file storage");
            Box::new(FileStorage::new(dir))
        }
        _ => {
            info!("Using in-memory storage");
            Box::new(MemoryStorage::new())
        }
    };
    SessionStore::open(storage, config.generation.clone())
}

fn prompt() {
    print!("\n> ");
    let _ = io::stdout().flush();
}

/// Run the console until `exit`, EOF or an idle Ctrl-C.
pub async fn run(config: AppConfig) -> io::Result<()> {
    let mut store = open_store(&config);

    let generator: Arc<dyn Generator> = if config.offline {
        Arc::new(OfflineGenerator::new())
    } else {
        Arc::new(HttpGenerator::new())
    };
    let coordinator = StreamingCoordinator::new(Arc::new(ConsoleSink))
        .with_filler_interval(config.filler_interval);
    let dispatcher = Dispatcher::new(generator, coordinator, Arc::new(SystemClock));

    println!("{}", welcome());
    if config.offline {
        println!("\n[offline mode: playing the built-in demo case]");
    } else if store.get().generation_config.key.is_empty() {
        println!("\nNo API key configured. Use 'config key <your-key>' or restart with --offline.");
    }
    if let Some(notice) = store.take_notice() {
        println!("\n{notice}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            // EOF
            println!();
            break;
        };

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let response = dispatcher.execute(&line, &mut store, &cancel).await;
        watcher.abort();

        match response.action {
            Action::ClearScreen => {
                print!("\x1b[2J\x1b[H");
                let _ = io::stdout().flush();
            }
            Action::Exit => {
                println!("{}", response.text);
                break;
            }
            Action::Continue => {
                if !response.text.is_empty() {
                    println!("{}", response.text);
                }
            }
        }
    }

    Ok(())
}
