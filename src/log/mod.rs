//! Logging for simulation runs, built on the `log` facade.
//!
//! Nothing is logged until a level is set. The runner sets one from `--log-level`, which
//! accepts a single level (`info`) or comma separated `target=level` pairs such as
//! `geospread::movement=trace,geospread=info`. Library users call the free functions below:
//!
//! ```rust
//! use geospread::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! set_log_level(LevelFilter::Info);
//! set_module_filter("geospread::proximity", LevelFilter::Debug);
//! ```
//!
//! With the `logging` feature the records go to stderr through `log4rs`; without it only
//! the facade's maximum level is kept up to date.
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

use std::str::FromStr;
use std::sync::{LazyLock, Mutex, MutexGuard};

pub use log::{debug, error, info, trace, warn, LevelFilter};
#[cfg(feature = "logging")]
use log4rs::Handle;

use crate::error::GeospreadError;
use crate::hashing::HashMap;

static LOGGER_STATE: LazyLock<Mutex<LoggerState>> = LazyLock::new(Mutex::default);

/// A level filter for every record whose target starts with `target`.
#[derive(Clone, Debug, PartialEq)]
struct TargetFilter {
    target: String,
    level: LevelFilter,
}

/// Filters currently installed in the process-wide logger.
#[derive(Debug)]
pub(in crate::log) struct LoggerState {
    /// Applies to targets without a filter of their own. `Off` silences everything.
    pub(in crate::log) root_level: LevelFilter,
    pub(in crate::log) targets: HashMap<String, TargetFilter>,

    #[cfg(feature = "logging")]
    handle: Option<Handle>,
}

impl Default for LoggerState {
    fn default() -> Self {
        LoggerState {
            root_level: LevelFilter::Off,
            targets: HashMap::default(),

            #[cfg(feature = "logging")]
            handle: None,
        }
    }
}

impl LoggerState {
    fn update(&mut self, root_level: Option<LevelFilter>, filters: &[(&str, LevelFilter)]) {
        let mut changed = false;
        if let Some(level) = root_level {
            changed |= self.root_level != level;
            self.root_level = level;
        }
        for &(target, level) in filters {
            let filter = TargetFilter {
                target: target.to_string(),
                level,
            };
            changed |= self.targets.insert(target.to_string(), filter.clone()) != Some(filter);
        }
        // Installing the first configuration is what turns the logger on.
        if changed || !self.is_installed() {
            self.install();
        }
    }

    fn remove(&mut self, target: &str) {
        if self.targets.remove(target).is_some() {
            self.install();
        }
    }

    #[cfg_attr(not(feature = "logging"), allow(dead_code))]
    fn sorted_targets(&self) -> Vec<&TargetFilter> {
        let mut targets: Vec<_> = self.targets.values().collect();
        targets.sort_by(|a, b| a.target.cmp(&b.target));
        targets
    }
}

/// Logs every record.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the level for targets without a filter of their own.
pub fn set_log_level(level: LevelFilter) {
    logger_state().update(Some(level), &[]);
}

/// Sets the level for `target` and every target below it.
pub fn set_module_filter(target: &str, level: LevelFilter) {
    logger_state().update(None, &[(target, level)]);
}

/// Sets several target filters at once.
pub fn set_module_filters(filters: &[(&str, LevelFilter)]) {
    logger_state().update(None, filters);
}

/// Drops the filter for `target`, which then follows the global level again.
pub fn remove_module_filter(target: &str) {
    logger_state().remove(target);
}

/// A parsed `--log-level` argument.
#[derive(Debug, PartialEq)]
pub enum LogLevelArg {
    Global(LevelFilter),
    Modules(Vec<(String, LevelFilter)>),
}

fn parse_level(level: &str) -> Result<LevelFilter, GeospreadError> {
    LevelFilter::from_str(level.trim())
        .map_err(|_| GeospreadError::ConfigurationError(format!("unknown log level {level:?}")))
}

/// Parses `level` or `target=level[,target=level...]`.
///
/// # Errors
///
/// Returns `ConfigurationError` for an unknown level or an empty target.
pub fn parse_log_level_arg(arg: &str) -> Result<LogLevelArg, GeospreadError> {
    if !arg.contains('=') {
        return parse_level(arg).map(LogLevelArg::Global);
    }
    arg.split(',')
        .map(|pair| {
            let (target, level) = pair.split_once('=').unwrap_or((pair, ""));
            let target = target.trim();
            if target.is_empty() {
                return Err(GeospreadError::ConfigurationError(format!(
                    "missing module name in {pair:?}"
                )));
            }
            Ok((target.to_string(), parse_level(level)?))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LogLevelArg::Modules)
}

/// Installs a parsed `--log-level` argument. Target filters come with a global `Info`.
pub fn apply_log_level_arg(arg: &LogLevelArg) {
    match arg {
        LogLevelArg::Global(level) => set_log_level(*level),
        LogLevelArg::Modules(filters) => {
            let filters: Vec<(&str, LevelFilter)> = filters
                .iter()
                .map(|(target, level)| (target.as_str(), *level))
                .collect();
            logger_state().update(Some(LevelFilter::Info), &filters);
        }
    }
}

fn logger_state() -> MutexGuard<'static, LoggerState> {
    // A panic while holding the lock leaves the filters intact.
    LOGGER_STATE
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
