use std::process;
use std::time::Duration;

use anyhow::Context;
use carpark::{Lot, LotConfig, LotError, LotSummary, Pacing};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_RUNTIME: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_INVARIANT: i32 = 3;

#[derive(Debug, Clone, PartialEq)]
struct Options {
    config: LotConfig,
    duration: Option<Duration>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            print_usage(args.first().map(String::as_str).unwrap_or("carpark"));
            process::exit(EXIT_USAGE);
        }
    };

    init_tracing();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to build runtime: {e}");
            process::exit(EXIT_RUNTIME);
        }
    };

    match runtime.block_on(run(options)) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize summary: {e}");
                process::exit(EXIT_RUNTIME);
            }
        },
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(exit_code(&e));
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <capacity> [options]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <capacity>         Number of parking spaces (positive integer)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --parkers <n>      Producer threads [default: 3]");
    eprintln!("  --pickers <n>      Consumer threads [default: 3]");
    eprintln!("  --min-pause <ms>   Shortest pause before each attempt [default: 0]");
    eprintln!("  --max-pause <ms>   Longest pause before each attempt [default: 1000]");
    eprintln!("  --period <secs>    Seconds between consistency reports [default: 2]");
    eprintln!("  --no-monitor       Run without the consistency monitor");
    eprintln!("  --ops <n>          Stop each worker after n operations");
    eprintln!("  --duration <secs>  Shut down after this many seconds");
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LotError>() {
        Some(e) if e.is_invariant_violation() => EXIT_INVARIANT,
        Some(LotError::Config(_)) => EXIT_USAGE,
        _ => EXIT_RUNTIME,
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse()
        .map_err(|_| format!("invalid value for {flag}: '{value}'"))
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut capacity: Option<usize> = None;
    let mut parkers = carpark::config::DEFAULT_WORKERS;
    let mut pickers = carpark::config::DEFAULT_WORKERS;
    let mut pacing = Pacing::default();
    let mut period = Some(carpark::config::DEFAULT_MONITOR_PERIOD);
    let mut ops: Option<u64> = None;
    let mut duration: Option<Duration> = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--parkers" => {
                i += 1;
                parkers = parse_value("--parkers", args.get(i))?;
            }
            "--pickers" => {
                i += 1;
                pickers = parse_value("--pickers", args.get(i))?;
            }
            "--min-pause" => {
                i += 1;
                pacing.min_ms = parse_value("--min-pause", args.get(i))?;
            }
            "--max-pause" => {
                i += 1;
                pacing.max_ms = parse_value("--max-pause", args.get(i))?;
            }
            "--period" => {
                i += 1;
                let secs: f64 = parse_value("--period", args.get(i))?;
                period = Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|_| format!("invalid value for --period: '{secs}'"))?,
                );
            }
            "--no-monitor" => period = None,
            "--ops" => {
                i += 1;
                ops = Some(parse_value("--ops", args.get(i))?);
            }
            "--duration" => {
                i += 1;
                let secs: f64 = parse_value("--duration", args.get(i))?;
                duration = Some(
                    Duration::try_from_secs_f64(secs)
                        .map_err(|_| format!("invalid value for --duration: '{secs}'"))?,
                );
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if capacity.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                capacity = Some(
                    arg.parse()
                        .map_err(|_| format!("capacity must be a positive integer, got '{arg}'"))?,
                );
            }
        }
        i += 1;
    }

    let capacity = capacity.ok_or("missing required argument: <capacity>")?;

    let mut config = LotConfig::new(capacity)
        .with_parkers(parkers)
        .with_pickers(pickers)
        .with_pacing(pacing);
    config = match period {
        Some(period) => config.with_monitor_period(period),
        None => config.without_monitor(),
    };
    if let Some(ops) = ops {
        config = config.with_ops_per_worker(ops);
    }
    config.validate().map_err(|e| e.to_string())?;

    Ok(Options { config, duration })
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("CARPARK_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "carpark={level},carpark_cli={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_thread_names(true).with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

async fn run(options: Options) -> anyhow::Result<LotSummary> {
    let Options { config, duration } = options;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %serde_json::to_string(&config).context("failed to serialize config")?,
        "Starting carpark"
    );

    let lot = Lot::start(config).context("failed to start lot")?;
    let handle = lot.handle();
    let mut joined = tokio::task::spawn_blocking(move || lot.join());

    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = &mut joined => {
            return Ok(result.context("lot join task failed")??);
        }
        _ = shutdown_signal() => {}
        _ = deadline => {
            info!("Run duration elapsed, shutting down...");
        }
    }

    handle.shutdown();
    let summary = joined.await.context("lot join task failed")??;
    Ok(summary)
}

/// Wait for SIGINT or SIGTERM.
///
/// A handler that fails to install is logged and never fires; the lot then
/// runs until another stop condition.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("carpark")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn capacity_only_uses_defaults() {
        let options = parse_args(&args(&["5"])).unwrap();
        assert_eq!(options.config, LotConfig::new(5));
        assert_eq!(options.duration, None);
    }

    #[test]
    fn missing_capacity_is_usage_error() {
        let err = parse_args(&args(&[])).unwrap_err();
        assert_eq!(err, "missing required argument: <capacity>");
    }

    #[test]
    fn non_positive_capacity_rejected() {
        assert_eq!(
            parse_args(&args(&["0"])).unwrap_err(),
            "capacity must be a positive integer, got 0"
        );
        assert_eq!(
            parse_args(&args(&["-3"])).unwrap_err(),
            "unknown flag: -3"
        );
        assert_eq!(
            parse_args(&args(&["ten"])).unwrap_err(),
            "capacity must be a positive integer, got 'ten'"
        );
    }

    #[test]
    fn flags_override_defaults() {
        let options = parse_args(&args(&[
            "4",
            "--parkers",
            "2",
            "--pickers",
            "2",
            "--min-pause",
            "5",
            "--max-pause",
            "50",
            "--period",
            "0.5",
            "--ops",
            "100",
            "--duration",
            "3",
        ]))
        .unwrap();

        let expected = LotConfig::new(4)
            .with_parkers(2)
            .with_pickers(2)
            .with_pacing(Pacing::between(5, 50))
            .with_monitor_period(Duration::from_millis(500))
            .with_ops_per_worker(100);
        assert_eq!(options.config, expected);
        assert_eq!(options.duration, Some(Duration::from_secs(3)));
    }

    #[test]
    fn no_monitor_flag() {
        let options = parse_args(&args(&["1", "--no-monitor"])).unwrap();
        assert_eq!(options.config.monitor_period(), None);
    }

    #[test]
    fn bad_flags_are_reported() {
        assert_eq!(
            parse_args(&args(&["1", "--parkers"])).unwrap_err(),
            "--parkers requires a value"
        );
        assert_eq!(
            parse_args(&args(&["1", "--pickers", "many"])).unwrap_err(),
            "invalid value for --pickers: 'many'"
        );
        assert_eq!(
            parse_args(&args(&["1", "--fast"])).unwrap_err(),
            "unknown flag: --fast"
        );
        assert_eq!(
            parse_args(&args(&["1", "2"])).unwrap_err(),
            "unexpected argument: 2"
        );
        assert!(parse_args(&args(&["--help"])).unwrap_err().is_empty());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let violation = anyhow::Error::new(LotError::InvariantViolation {
            produced: 2,
            consumed: 0,
            occupied: 1,
        })
        .context("lot failed");
        assert_eq!(exit_code(&violation), EXIT_INVARIANT);

        let alloc = anyhow::Error::new(LotError::Allocation { capacity: 1 });
        assert_eq!(exit_code(&alloc), EXIT_RUNTIME);

        let config = anyhow::Error::new(LotError::Config(carpark::ConfigError::NoParkers));
        assert_eq!(exit_code(&config), EXIT_USAGE);
    }
}
