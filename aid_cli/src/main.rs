mod cli;
mod error_fmt;
mod recommend;
mod report;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Console logs go to stderr so stdout stays parseable; the optional file
/// layer writes JSON lines through a non-blocking appender.
fn init_tracing(json: bool, level: &str, logging: Option<&aid_config::Logging>) {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console: BoxedLayer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };
    let mut layers = vec![console];

    if let Some(file) = logging.and_then(|l| l.file.as_deref()) {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| "aid.log".into(), |n| n.to_string_lossy().into_owned());
        let appender = match logging.and_then(|l| l.rotation.as_deref()) {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_level = logging
            .and_then(|l| l.level.as_deref())
            .unwrap_or("info");
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(file_level))
                .boxed(),
        );
    }

    let _ = tracing_subscriber::registry().with(layers).try_init();
}

fn run(cli: &Cli) -> eyre::Result<()> {
    let json = cli.json;

    if let Commands::Snapshots { file } = &cli.cmd {
        init_tracing(json, &cli.log_level, None);
        return recommend::run_snapshots(file, json);
    }

    let loaded = recommend::load(&cli.config, cli.schedule_dir.as_deref())?;
    init_tracing(json, &cli.log_level, Some(&loaded.config.logging));
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match &cli.cmd {
        Commands::Recommend {
            input,
            now,
            iob_log,
        } => {
            let inp = recommend::read_input(input)?;
            let now = recommend::resolve_now(*now, &inp, &aid_traits::SystemClock::new());
            let out = recommend::run_recommend(&loaded, &inp, now, iob_log.as_deref())?;
            recommend::print_outcome(&out, loaded.cycle.bg.unit.as_str(), json)
        }
        Commands::Iob { input, now } => {
            let inp = recommend::read_input(input)?;
            let now = recommend::resolve_now(*now, &inp, &aid_traits::SystemClock::new());
            recommend::run_iob(&loaded, &inp, now, json)
        }
        Commands::CheckConfig => {
            recommend::print_config_summary(&loaded, json);
            Ok(())
        }
        Commands::Snapshots { .. } => Ok(()),
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(e) = run(&cli) {
        tracing::error!(error = %e, "command failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}
