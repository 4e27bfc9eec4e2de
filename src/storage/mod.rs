pub mod fortio;
pub mod index_cache;
pub mod record;
pub mod source;

pub use fortio::{Endian, FortioReader, KeywordWriter};
pub use index_cache::IndexCache;
pub use record::{HeaderRead, RecordReader};
pub use source::KeywordSource;
