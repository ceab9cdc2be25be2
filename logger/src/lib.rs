use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;
use std::{process, sync::Arc};

/// A logger instance for logfmt format (https://www.brandur.org/logfmt)
#[derive(Debug)]
pub struct HubLogger {
    node_id: String,
    backend: String,
}

static HUB_LOGGER: OnceCell<Arc<HubLogger>> = OnceCell::new();

impl HubLogger {
    pub fn init(node_id: &str, backend: &str, level_filter: LevelFilter) {
        let logger = HUB_LOGGER.get_or_init(|| {
            Arc::new(HubLogger {
                node_id: node_id.to_string(),
                backend: backend.to_string(),
            })
        });
        // This function gets called multiple times by the tests so ignore the error.
        let _ = log::set_logger(logger.as_ref()).map(|()| log::set_max_level(level_filter));
    }

    pub fn global() -> Arc<HubLogger> {
        HUB_LOGGER.get().expect("logger is not initialized").clone()
    }

    fn format(&self, record: &Record) -> String {
        let level = record.level().to_string().to_lowercase();
        format!(
            "level={level} pid={} message=\"{}\" target=\"{}\" node_id={} backend={}",
            process::id(),
            escape(&record.args().to_string()),
            record.target(),
            self.node_id,
            self.backend
        )
    }
}

fn escape(message: &str) -> String {
    message.replace('"', "\\\"")
}

impl Log for HubLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{}", self.format(record));
        }
    }

    fn flush(&self) {}
}
