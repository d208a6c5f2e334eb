pub mod aws;
pub mod domain;
pub mod kafka;
pub mod nats;
pub mod s3;
pub mod secrets;
pub mod telemetry;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockCredentialSource;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockObjectStore;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockRecordSink;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockJetStreamConsumer;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockPullConsumer;
