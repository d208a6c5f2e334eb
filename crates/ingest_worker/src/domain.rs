mod batch_publisher;
mod batch_result;
mod envelope_unwrapper;
mod error;
mod ingestion_service;
mod line_decoder;
mod object_fetcher;
mod topic_router;

pub use batch_publisher::*;
pub use batch_result::*;
pub use envelope_unwrapper::*;
pub use error::*;
pub use ingestion_service::*;
pub use line_decoder::*;
pub use object_fetcher::*;
pub use topic_router::*;
