pub mod handle;

pub use handle::{FileHandle, OpenFlags};
