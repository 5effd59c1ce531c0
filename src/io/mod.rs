//! File access substrate shared by the analyzer and the wipe engine

pub mod handle;
pub mod reader;

pub use handle::{AccessMode, FileHandle};
pub use reader::ByteStreamReader;
