//! Writes log records to stderr with `log4rs`.
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::log::{LoggerState, TargetFilter};

// ISO 8601 timestamp, highlighted level, target
const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%SZ)} {h({l})} {t} - {m}{n}";
const APPENDER: &str = "stderr";

impl From<&TargetFilter> for Logger {
    fn from(filter: &TargetFilter) -> Self {
        Logger::builder().build(filter.target.clone(), filter.level)
    }
}

impl LoggerState {
    pub(in crate::log) fn is_installed(&self) -> bool {
        self.handle.is_some()
    }

    /// Replaces the running `log4rs` configuration with the current filters, initializing
    /// `log4rs` on first use.
    pub(in crate::log) fn install(&mut self) {
        let stderr = ConsoleAppender::builder()
            .target(Target::Stderr)
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build();
        let builder = self.sorted_targets().into_iter().fold(
            Config::builder().appender(Appender::builder().build(APPENDER, Box::new(stderr))),
            |builder, filter| builder.logger(filter.into()),
        );
        let root = Root::builder().appender(APPENDER).build(self.root_level);
        let config = match builder.build(root) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("invalid logging configuration: {err}");
                return;
            }
        };

        match self.handle {
            Some(ref handle) => handle.set_config(config),
            None => match log4rs::init_config(config) {
                Ok(handle) => self.handle = Some(handle),
                // Some other logger owns the facade.
                Err(_) => log::set_max_level(self.root_level),
            },
        }
    }
}
