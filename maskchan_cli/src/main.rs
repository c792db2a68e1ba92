//! # maskchan_cli
//!
//! Part of the maskchan crate family.
//!
//! This is the command line application which builds alignment board textures.
//!
//! ## Use
//!
//! Make a template configuration with
//!
//! ```bash
//! maskchan_cli -p config.yml new
//! ```
//!
//! then fill it out and build the board with
//!
//! ```bash
//! maskchan_cli -p config.yml
//! ```
//!
//! `--timeout <seconds>` abandons a build which runs for longer than that. Detailed progress
//! is written to `./maskchan.log`.
use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use libmaskchan::config::Config;
use libmaskchan::process::process;
use libmaskchan::worker_status::BuildStatus;

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

/// Library output goes to a log file, terminal feedback goes through `log`
fn init_file_logger() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from("./maskchan.log"))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn main() {
    // Create a cli
    let matches = Command::new("maskchan_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_parser(clap::value_parser!(u64))
                .help("Abandon the build after this many seconds"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_logger() {
        log::warn!("Could not create log file, library output is lost: {e}");
    }
    spdlog::info!("Starting maskchan CLI");

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(path) => PathBuf::from(path),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        make_template_config(&config_path);
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!("Board Path: {}", config.board_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    if let Some(root) = config.data_root.as_ref() {
        log::info!("Data Root: {}", root.to_string_lossy());
    }
    if let Some(cache) = config.cache_path.as_ref() {
        log::info!("Cache Path: {}", cache.to_string_lossy());
    }
    log::info!(
        "Slabs: {} Divisibility: {} Downsample: {}",
        config.slab_count,
        config.axial_divisibility,
        config.downsample_rate
    );

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::with_template("{msg:>24} [{bar:40.cyan/blue}] {pos:>3}%") {
        pb.set_style(style);
    }
    let (tx, rx) = channel::<BuildStatus>();
    let cancel = Arc::new(AtomicBool::new(false));
    let worker_cancel = cancel.clone();
    let timeout = matches.get_one::<u64>("timeout").map(|s| Duration::from_secs(*s));
    let start = Instant::now();

    // Spawn the task!
    let handle = std::thread::spawn(move || process(&config, &tx, worker_cancel));

    loop {
        // Without a UI loop, poll the worker twice a second
        std::thread::sleep(Duration::from_millis(500));
        for status in rx.try_iter() {
            pb.set_message(format!("{} {}", status.phase, status.renderable));
            pb.set_position((status.progress * 100.0) as u64);
        }

        if timeout.is_some_and(|limit| start.elapsed() > limit) && !cancel.load(Ordering::Relaxed)
        {
            log::warn!("Build ran past the timeout, cancelling...");
            cancel.store(true, Ordering::Relaxed);
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(path) => log::info!(
                        "Successfully built board texture, see {}",
                        path.to_string_lossy()
                    ),
                    Err(e) => {
                        log::error!("Board build failed with error: {e}");
                        log::error!("Check ./maskchan.log for details");
                    }
                },
                Err(_) => log::error!("Failed to join build task!"),
            }
            break;
        }
    }

    pb.finish();
    spdlog::info!("Stopping maskchan CLI");

    log::info!("Done.");
}
