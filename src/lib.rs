#![doc = include_str!("../README.md")]

#[cfg(feature = "http")]
pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod grace;
pub mod jobs;
pub mod polling;
pub mod session;
mod storage;
pub mod subscription;
#[cfg(feature = "http")]
pub mod transport;
pub mod types;
pub mod upload;

// Re-exports for convenient access
#[cfg(feature = "http")]
pub use auth::TokenResponse;
pub use classify::{ApiError, Destinations, Effect, EffectSink, ErrorCategory, TracingSink};
pub use config::ClientConfig;
pub use error::Error;
pub use grace::{
    Clock, FilePaymentEventStore, GracePeriodGate, MemoryPaymentEventStore, PaymentEventStore,
    SystemClock, record_payment_success,
};
pub use jobs::JobSource;
pub use polling::{Callbacks, JobObserver, JobPoller, PollHandle, PollState};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
pub use subscription::{Access, access_decision};
#[cfg(feature = "http")]
pub use transport::ApiClient;
pub use types::{
    Job, JobId, JobStatus, PaymentEvent, SessionCredentials, SubscriptionSnapshot,
    SubscriptionStatus, UploadReceipt,
};
#[cfg(feature = "http")]
pub use upload::UploadFile;
pub use upload::{ProgressTracker, UploadConfig, UploadPhase, UploadProgress};
