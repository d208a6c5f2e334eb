mod config;
mod record_sink;

pub use config::*;
pub use record_sink::*;
