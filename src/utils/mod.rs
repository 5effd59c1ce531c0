//! Shared utilities: cancellation, formatting and logging setup

pub mod cancel;
pub mod format;
pub mod logging;

pub use self::{
    cancel::CancellationToken,
    format::{human_readable_size, mode_to_string},
    logging::{init_logging, LogLevel},
};
