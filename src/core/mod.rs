pub mod data;
pub mod keyword;
pub mod types;

pub use data::*;
pub use keyword::*;
pub use types::*;
