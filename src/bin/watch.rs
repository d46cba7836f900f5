use ctfwatch::cache::CacheStore;
use ctfwatch::cli;
use ctfwatch::client::HttpCatalog;
use ctfwatch::config::Config;
use ctfwatch::context::{AppContext, StandardContext};
use ctfwatch::mailer::SmtpMailer;
use ctfwatch::watch::WatchCycle;
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut root: Option<PathBuf> = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" | "help" => {
                cli::print_help(&args[0]);
                return ExitCode::SUCCESS;
            }
            "-V" | "--version" => {
                println!("ctfwatch {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            "-c" | "--config" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("--config requires a path");
                    return ExitCode::FAILURE;
                };
                config_path = Some(PathBuf::from(value));
            }
            "-r" | "--root" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    eprintln!("--root requires a path");
                    return ExitCode::FAILURE;
                };
                root = Some(PathBuf::from(value));
            }
            "-v" | "--verbose" => verbose = true,
            other => {
                eprintln!("Unknown argument '{}', try --help", other);
                return ExitCode::FAILURE;
            }
        }
        i += 1;
    }

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("Failed to initialise logging");
    }

    let ctx = StandardContext::new(root);

    // Fail fast on configuration problems; everything after this point is
    // best-effort and never exits non-zero.
    let config = match &config_path {
        Some(path) => Config::load_from(path),
        None => Config::load(&ctx),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", e);
            log::error!("Run with --help for a configuration example");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        log::error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let catalog = match HttpCatalog::new(
        &config.api_base,
        &config.user_agent,
        Duration::from_secs(config.http_timeout_secs),
    ) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let mailer = match SmtpMailer::new(&config.smtp) {
        Ok(mailer) => mailer,
        Err(e) => {
            log::error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache_path = match &config.cache_file {
        Some(path) => path.clone(),
        None => match ctx.get_cache_file_path() {
            Ok(path) => path,
            Err(e) => {
                log::error!("{:#}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let store = CacheStore::new(cache_path);

    log::info!("Starting CTF watcher (catalog: {})", config.api_base);
    let cycle = WatchCycle::new(
        &catalog,
        &mailer,
        &store,
        config.remind_window_hours,
        Duration::from_secs_f64(config.detail_delay_secs),
    );
    let stats = cycle.run().await;
    log::info!(
        "Cycle complete: {} new CTF(s), {} reminder(s) sent",
        stats.new_ctfs,
        stats.reminders_sent
    );
    ExitCode::SUCCESS
}
