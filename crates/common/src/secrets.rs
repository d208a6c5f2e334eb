mod retry;
mod secrets_manager;

pub use retry::*;
pub use secrets_manager::*;
