mod notification_processor;

pub use notification_processor::*;
