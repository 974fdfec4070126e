//! Keeps the `log` facade's maximum level in sync when the `logging` feature is off.
//! Records are discarded since no logger is installed.
use crate::log::LoggerState;

impl LoggerState {
    pub(in crate::log) fn is_installed(&self) -> bool {
        true
    }

    pub(in crate::log) fn install(&mut self) {
        let most_verbose = self
            .targets
            .values()
            .map(|filter| filter.level)
            .fold(self.root_level, Ord::max);
        log::set_max_level(most_verbose);
    }
}
