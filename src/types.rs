//! Domain types shared by the transport, poller and stores.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

/// Server-assigned job identifier (opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Job lifecycle status as reported by the server.
///
/// Ordered: `Pending < Processing < {Completed, Failed}`. A job never moves
/// to a lower rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle; terminal states share the top rank.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

/// Snapshot of a job as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Percent complete, 0 to 100.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
    #[serde(default)]
    pub result: Option<JsonValue>,
}

impl Job {
    /// Create a bare snapshot (used by tests and fakes).
    #[must_use]
    pub fn new(id: impl Into<JobId>, status: JobStatus, progress: f64) -> Self {
        Self {
            id: id.into(),
            status,
            progress,
            filename: None,
            created_at: None,
            updated_at: None,
            completed_at: None,
            error: None,
            result: None,
        }
    }

    /// Set the original file name.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the processing result.
    #[must_use]
    pub fn with_result(mut self, result: JsonValue) -> Self {
        self.result = Some(result);
        self
    }

    /// Progress clamped to `0..=100` and rounded down.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        if self.progress.is_nan() {
            return 0;
        }
        self.progress.clamp(0.0, 100.0) as u8
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Access/refresh token pair held by the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl SessionCredentials {
    /// Pair from an access token and an optional refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Anchor for the grace period: when a payment success was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
}

/// Response of `POST /upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct UploadReceipt {
    #[serde(rename = "jobId", alias = "job_id")]
    pub job_id: JobId,
    #[serde(default)]
    pub message: String,
    /// Server estimate in seconds.
    #[serde(
        default,
        rename = "estimatedProcessingTime",
        alias = "estimated_processing_time"
    )]
    pub estimated_processing_time: Option<f64>,
}

/// Subscription state as reported by the billing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Incomplete,
    #[serde(other)]
    Inactive,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn is_paid(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// Snapshot of `GET /subscription`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SubscriptionSnapshot {
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub plan: Option<String>,
    /// `None` means unlimited.
    #[serde(default)]
    pub usage_limit: Option<u64>,
    #[serde(default)]
    pub current_usage: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
}

impl SubscriptionSnapshot {
    /// Snapshot with no plan and no usage.
    #[must_use]
    pub fn new(status: SubscriptionStatus) -> Self {
        Self {
            status,
            plan: None,
            usage_limit: None,
            current_usage: 0,
            current_period_end: None,
        }
    }

    /// Set usage against the period's limit (`None` is unlimited).
    #[must_use]
    pub fn with_usage(mut self, current_usage: u64, usage_limit: Option<u64>) -> Self {
        self.current_usage = current_usage;
        self.usage_limit = usage_limit;
        self
    }

    /// Whether another job fits in the current period's quota.
    #[must_use]
    pub fn has_quota(&self) -> bool {
        self.usage_limit
            .is_none_or(|limit| self.current_usage < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_is_monotonic() {
        use JobStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Failed));
        assert!(Pending.can_advance_to(Completed));
        assert!(!Processing.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Processing));
        assert!(!Completed.can_advance_to(Failed));
        assert!(Completed.can_advance_to(Completed));
    }

    #[test]
    fn job_deserializes_server_snapshot() {
        let json = r#"{
            "id": "j1",
            "status": "processing",
            "progress": 45,
            "filename": "orders.csv",
            "created_at": "2026-10-01T12:00:00Z",
            "error_message": null
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, JobId::from("j1"));
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress_percent(), 45);
        assert_eq!(job.filename.as_deref(), Some("orders.csv"));
        assert!(job.created_at.is_some());
        assert!(job.result.is_none());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(Job::new("a", JobStatus::Processing, 140.0).progress_percent(), 100);
        assert_eq!(Job::new("a", JobStatus::Processing, -3.0).progress_percent(), 0);
        assert_eq!(Job::new("a", JobStatus::Processing, f64::NAN).progress_percent(), 0);
    }

    #[test]
    fn upload_receipt_accepts_camel_case() {
        let json = r#"{"jobId":"j9","message":"queued","estimatedProcessingTime":30}"#;
        let receipt: UploadReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.job_id.as_str(), "j9");
        assert_eq!(receipt.estimated_processing_time, Some(30.0));
    }

    #[test]
    fn upload_receipt_accepts_fractional_estimate() {
        let json = r#"{"jobId":"job-1","estimatedProcessingTime":12.5}"#;
        let receipt: UploadReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.job_id.as_str(), "job-1");
        assert_eq!(receipt.estimated_processing_time, Some(12.5));
        assert!(receipt.message.is_empty());
    }

    #[test]
    fn unknown_subscription_status_is_inactive() {
        let snap: SubscriptionSnapshot =
            serde_json::from_str(r#"{"status":"unpaid","current_usage":3}"#).unwrap();
        assert_eq!(snap.status, SubscriptionStatus::Inactive);
        assert!(!snap.status.is_paid());
    }

    #[test]
    fn quota_check() {
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Active).with_usage(10, Some(10));
        assert!(!snap.has_quota());
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Active).with_usage(10, None);
        assert!(snap.has_quota());
    }

    #[test]
    fn credentials_debug_redacts_tokens() {
        let creds = SessionCredentials::new("secret-access", Some("secret-refresh".into()));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
    }
}
