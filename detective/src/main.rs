//! Murder-mystery detective console.
//!
//! A line-oriented REPL over the detective engine. Logs go to stderr and are
//! controlled with `RUST_LOG` (default `warn`).
//!
//! ```bash
//! cargo run -p detective -- --offline
//! ```

mod repl;

use detective_core::AppConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line options layered over the environment config.
#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    data_dir: Option<PathBuf>,
    no_persist: bool,
    offline: bool,
    filler_ms: Option<u64>,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => options.help = true,
            "--no-persist" => options.no_persist = true,
            "--offline" => options.offline = true,
            "--data-dir" => {
                let dir = args.get(i + 1).ok_or("--data-dir needs a path")?;
                options.data_dir = Some(PathBuf::from(dir));
                i += 1;
            }
            "--filler-ms" => {
                let ms = args.get(i + 1).ok_or("--filler-ms needs a number")?;
                let ms = ms
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| format!("invalid --filler-ms value: {ms}"))?;
                options.filler_ms = Some(ms);
                i += 1;
            }
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }

    Ok(options)
}

fn apply(options: &Options, mut config: AppConfig) -> AppConfig {
    if let Some(dir) = &options.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(ms) = options.filler_ms {
        config.filler_interval = Duration::from_millis(ms);
    }
    config.persist = !options.no_persist;
    config.offline = options.offline;
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run with --help for usage.");
            std::process::exit(2);
        }
    };

    if options.help {
        print_help();
        return Ok(());
    }

    let config = apply(&options, AppConfig::from_env());
    repl::run(config).await?;
    Ok(())
}

fn print_help() {
    println!("Detective - generated murder-mystery cases in your terminal");
    println!();
    println!("USAGE:");
    println!("  detective [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help          Show this help message");
    println!("  --data-dir <PATH>   Where to keep the saved session");
    println!("  --no-persist        Keep the session in memory only");
    println!("  --offline           Play the built-in demo case without a backend");
    println!("  --filler-ms <MS>    Delay between progress lines (default 800)");
    println!();
    println!("ENVIRONMENT:");
    println!("  DETECTIVE_API_URL   Chat completions endpoint");
    println!("  DETECTIVE_API_KEY   API key");
    println!("  DETECTIVE_MODEL     Model name (default gpt-4)");
    println!("  DETECTIVE_DATA_DIR  Session directory");
    println!("  RUST_LOG            Log filter, written to stderr (default warn)");
    println!();
    println!("Inside the game, type 'help' for commands. Ctrl-C cancels a pending request.");
}
