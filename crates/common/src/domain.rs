mod credentials;
mod outbound;
mod storage_event;

pub use credentials::*;
pub use outbound::*;
pub use storage_event::*;
