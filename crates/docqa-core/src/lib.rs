pub mod config;
pub mod data_processor;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Chunk, ChunkMetadata, SearchHit, SourceInfo, SourceKind};
