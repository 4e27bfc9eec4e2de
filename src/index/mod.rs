pub mod file_index;
pub mod restart;
pub mod view;

pub use file_index::{FileIndex, ScanStop};
pub use restart::{Phases, RestartCatalog, RestartHeader, RestartQuery, Simulator};
pub use view::{IndexView, ViewTag};
