//! `log` wrappers that can be silenced per module.
//!
//! A module opts in by declaring `const ENABLE_LOGS: bool` and importing the
//! macros from the crate root:
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn};
//!
//! log_warn!("timer record unreadable: {err:#}");
//! ```
//!
//! With the flag off the calls compile away, which keeps the noisy poll and
//! lifecycle paths quiet without touching the global `RUST_LOG` filter.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Resolves `ENABLE_LOGS` at the call site, so the calling module must
/// define it even if it only logs errors.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
