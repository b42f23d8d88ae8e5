use {
    chrono::{DateTime, NaiveDateTime},
    std::{env, path::PathBuf, process::ExitCode, time::Duration},
    tickflow::{
        config::{FeaturesConfig, ScraperConfig},
        features_core::{parse_resolution, run_extraction, Category, ExtractError},
        lifecycle::{request_stop, RunLock},
        scraper_core::{Daemon, WsTransport},
    },
    tokio::sync::watch,
};

#[tokio::main]
pub async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Logs go to stderr so feature CSV paths printed by scripts stay clean
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match args.first() {
        Some(command) => command.as_str(),
        None => {
            print_usage();
            return ExitCode::from(2);
        }
    };

    match command {
        "run" => cmd_run(&args[1..]).await,
        "stop" => cmd_stop(),
        "features" => cmd_features(&args[1..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            ExitCode::from(2)
        }
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tickflow run [-b BUFFER_SIZE]");
    eprintln!("  tickflow stop");
    eprintln!("  tickflow features <orders|trades|all> <START> <END> <RESOLUTION> [-p OUT_DIR] [-s STRIDE]");
    eprintln!();
    eprintln!("Instants are RFC 3339 or YYYY-MM-DDTHH:MM:SS (treated as UTC).");
    eprintln!("Resolution is one or more <int><unit> groups (d, h, min, s), e.g. 10min or 2h40min.");
    eprintln!("Stride is a percentage of the resolution in (0, 100]; below 100, trade windows overlap.");
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn parse_instant(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

async fn cmd_run(args: &[String]) -> ExitCode {
    let config = match ScraperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(2);
        }
    };

    let config = match flag_value(args, "-b") {
        Some(raw) => {
            let buffer_size = match raw.parse::<usize>() {
                Ok(size) => size,
                Err(_) => {
                    eprintln!("Invalid buffer size: {}", raw);
                    return ExitCode::from(2);
                }
            };
            match config.with_buffer_size(buffer_size) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("❌ {}", e);
                    return ExitCode::from(2);
                }
            }
        }
        None => config,
    };

    let lock = match RunLock::acquire(&config.run_dir) {
        Ok(lock) => lock,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!("🚀 Starting tickflow scraper...");
    log::info!("📊 Configuration:");
    log::info!("   Feed: {}", config.ws_url);
    log::info!("   Products: {}", config.products.join(", "));
    log::info!("   Database: {}", config.db_path);
    log::info!("   Buffer size: {}", config.buffer_size);

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_marker = lock.stop_marker_path().to_path_buf();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut poll = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if stop_marker.exists() {
                        log::info!("🛑 Stop marker found, draining...");
                        let _ = stop_tx.send(true);
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    log::info!("🛑 Ctrl-C received, draining...");
                    let _ = stop_tx.send(true);
                    break;
                }
            }
        }
    });

    let transport = Box::new(WsTransport::new(
        config.ws_url.clone(),
        config.products.clone(),
    ));
    let result = Daemon::new(config).run(transport, stop_rx).await;
    drop(lock);

    match result {
        Ok(report) => {
            log::info!(
                "✅ Scraper stopped: {} admitted, {} flushed, {} duplicate(s) discarded",
                report.admitted,
                report.flush.events_flushed,
                report.duplicates
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("❌ Scraper failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_stop() -> ExitCode {
    let config = match ScraperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(2);
        }
    };

    match request_stop(&config.run_dir) {
        Ok(()) => {
            log::info!("🛑 Stop requested, the scraper will drain and exit");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn cmd_features(args: &[String]) -> ExitCode {
    if args.len() < 4 {
        print_usage();
        return ExitCode::from(2);
    }

    let category = match Category::from_str(&args[0]) {
        Some(category) => category,
        None => {
            eprintln!("Unknown category: {} (expected orders, trades or all)", args[0]);
            return ExitCode::from(2);
        }
    };
    let start = match parse_instant(&args[1]) {
        Some(ms) => ms,
        None => {
            eprintln!("Invalid start instant: {}", args[1]);
            return ExitCode::from(2);
        }
    };
    let end = match parse_instant(&args[2]) {
        Some(ms) => ms,
        None => {
            eprintln!("Invalid end instant: {}", args[2]);
            return ExitCode::from(2);
        }
    };
    let resolution_ms = match parse_resolution(&args[3]) {
        Ok(ms) => ms,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    let flags = &args[4..];
    let out_dir = PathBuf::from(flag_value(flags, "-p").unwrap_or("."));
    let stride = match flag_value(flags, "-s") {
        Some(raw) => match raw.parse::<u8>() {
            Ok(pct) => pct,
            Err(_) => {
                eprintln!("Invalid stride: {}", raw);
                return ExitCode::from(2);
            }
        },
        None => 100,
    };

    let config = match FeaturesConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            return ExitCode::from(2);
        }
    };

    match run_extraction(&config, category, start, end, resolution_ms, stride, &out_dir).await {
        Ok(written) => {
            log::info!("✅ Wrote {} feature file(s)", written.len());
            ExitCode::SUCCESS
        }
        Err(ExtractError::Config(e)) => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            log::error!("❌ Feature extraction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
