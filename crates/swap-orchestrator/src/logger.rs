use std::fs::OpenOptions;

use serde::Serialize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{FormatFields, format::Writer},
    layer::{Context, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::SwapError;

const DEFAULT_LOG_FILTER: &str = "debug,rustyline=warn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub line: String,
    pub level: String,
}

/// Receives the orchestrator's log statements of level `INFO` and above
pub trait Logger: Send + Sync {
    fn log(&self, l: LogEntry);
}

struct ForwardingLogger {
    log_listener: Option<Box<dyn Logger>>,
}

impl<S> Layer<S> for ForwardingLogger
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().level() > &Level::INFO {
            return;
        }
        let Some(listener) = self.log_listener.as_ref() else {
            return;
        };
        let mut buf = String::new();
        let writer = Writer::new(&mut buf);
        if tracing_subscriber::fmt::format::DefaultFields::new()
            .format_fields(writer, event)
            .is_ok()
        {
            listener.log(LogEntry {
                line: buf,
                level: event.metadata().level().to_string(),
            });
        }
    }
}

/// Installs the global subscriber, appending to `swap.log` in `log_dir`.
///
/// Fails if the log file can't be opened or a global subscriber is already set.
pub fn init_logging(
    log_dir: &str,
    app_logger: Option<Box<dyn Logger>>,
    log_filter: Option<String>,
) -> Result<(), SwapError> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("{log_dir}/swap.log"))
        .map_err(|e| SwapError::Generic(e.to_string()))?;

    let filter = log_filter.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(log_file),
        )
        .with(ForwardingLogger {
            log_listener: app_logger,
        })
        .try_init()
        .map_err(|e| SwapError::Generic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::{debug, info, warn};

    use super::*;

    #[derive(Default)]
    struct CollectingLogger {
        entries: Arc<Mutex<Vec<LogEntry>>>,
    }

    impl Logger for CollectingLogger {
        fn log(&self, l: LogEntry) {
            self.entries.lock().unwrap().push(l);
        }
    }

    #[test]
    fn test_forwards_info_and_above() {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(ForwardingLogger {
            log_listener: Some(Box::new(CollectingLogger {
                entries: entries.clone(),
            })),
        });

        tracing::subscriber::with_default(subscriber, || {
            debug!("not forwarded");
            info!("quote received");
            warn!("quote failed");
        });

        let entries = entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, "INFO");
        assert!(entries[0].line.contains("quote received"));
        assert_eq!(entries[1].level, "WARN");
    }
}
