#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod config;
pub mod core;
pub mod error;
pub mod file;
pub mod index;
pub mod stats;
pub mod storage;

#[cfg(test)]
mod testkit;

pub use error::{EclError, Result};
pub use file::{FileHandle, OpenFlags};
