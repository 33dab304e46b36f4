//! Log output and error accounting for one process.
//!
//! Call sites use the `log` macros. `LogTracer` forwards those records into
//! the `tracing` registry installed here, next to the spans the reconciler
//! opens around each phase.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("A global subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("A logger is already installed: {0}")]
    Logger(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// Counts error-level events. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct ErrorCounter {
    count: Arc<AtomicUsize>,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl<S: Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::ERROR {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Filter directives used when the flags ask for more output or `RUST_LOG`
/// is unset.
fn default_directives(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info,zabbix_sync=debug"
    } else {
        "info"
    }
}

fn env_filter(verbose: bool, debug: bool) -> EnvFilter {
    let directives = default_directives(verbose, debug);
    if verbose || debug {
        return EnvFilter::new(directives);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Installs the global subscriber and returns the error counter behind the
/// process exit status.
///
/// The filter applies to the stderr output only, so error events are
/// counted whatever the verbosity.
pub fn init(verbose: bool, debug: bool) -> Result<ErrorCounter, LoggingError> {
    let counter = ErrorCounter::new();
    let output = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_filter(env_filter(verbose, debug));

    let subscriber = tracing_subscriber::registry()
        .with(output)
        .with(counter.clone());
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counter_counts_only_errors() {
        let counter = ErrorCounter::new();
        let subscriber = tracing_subscriber::registry().with(counter.clone());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("starting");
            tracing::warn!("skipping a file");
            tracing::error!("import failed");
            tracing::error!(template = "Linux", "export failed");
        });

        assert_eq!(counter.error_count(), 2);
    }

    #[test]
    fn test_error_counter_clones_share_count() {
        let counter = ErrorCounter::new();
        let clone = counter.clone();
        let subscriber = tracing_subscriber::registry().with(clone);

        tracing::subscriber::with_default(subscriber, || tracing::error!("boom"));
        assert_eq!(counter.error_count(), 1);
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(false, false), "info");
        assert_eq!(default_directives(true, false), "info,zabbix_sync=debug");
        assert_eq!(default_directives(true, true), "debug");
    }
}
