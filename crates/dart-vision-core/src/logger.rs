//! Stderr logging for the detection service.
//!
//! Lines look like `[  1.204s  INFO dart-detection orchestrator::engine] ...`:
//! uptime, level, the emitting thread (the detection worker runs on its own
//! thread) and the module path without the crate prefix.

use std::io::Write;
use std::str::FromStr;
use std::sync::OnceLock;
use std::thread;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted by [`init_from_env`] callers by default.
pub const LOG_ENV: &str = "DART_VISION_LOG";

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

fn short_target(target: &str) -> &str {
    ["dart_vision_core::", "dart_vision::"]
        .iter()
        .find_map(|prefix| target.strip_prefix(prefix))
        .unwrap_or(target)
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let current = thread::current();
        let mut out = std::io::stderr().lock();
        let _ = writeln!(
            out,
            "[{:8.3}s {:>5} {} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            current.name().unwrap_or("-"),
            short_target(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Only the first call has an effect.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Install the stderr logger at the level named in `var` (`error`..`trace`,
/// `off`), or `default` when it is unset or unparsable.
pub fn init_from_env(var: &str, default: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_level(level_from_env(var, default))
}

fn level_from_env(var: &str, default: LevelFilter) -> LevelFilter {
    std::env::var(var)
        .ok()
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(default)
}

/// Install a `tracing` subscriber; `RUST_LOG` directives win over `info`.
/// Spans are reported when they close, so per-cycle and per-warp timings
/// show up in the output.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
