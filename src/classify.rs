//! Error classification and UI effects.
//!
//! Classification is pure: a status code and a response body go in, an
//! [`ApiError`] and the [`Effect`] to perform come out. Executing the effect
//! (showing a toast, navigating) is left to an [`EffectSink`].

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// User-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Access token rejected; recoverable through a refresh.
    AuthExpired,
    /// Session cannot be recovered; the user must log in again.
    AuthInvalid,
    ValidationError,
    PaymentRequired,
    PermissionDenied,
    NotFound,
    RateLimited,
    ServerError,
    /// No response was received (connect failure, timeout).
    NetworkError,
    Unknown,
}

impl ErrorCategory {
    /// Category for a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 409 | 413 | 422 => Self::ValidationError,
            401 => Self::AuthExpired,
            402 => Self::PaymentRequired,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::AuthInvalid => "auth_invalid",
            Self::ValidationError => "validation_error",
            Self::PaymentRequired => "payment_required",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        }
    }

    /// Fallback message when the server gives none.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::AuthExpired => "Your session has expired.",
            Self::AuthInvalid => "Please log in again.",
            Self::ValidationError => "The request was invalid. Please check your input.",
            Self::PaymentRequired => "An active subscription is required.",
            Self::PermissionDenied => "You do not have permission to do that.",
            Self::NotFound => "The requested resource was not found.",
            Self::RateLimited => "Too many requests. Please slow down and try again.",
            Self::ServerError => "Something went wrong on our side. Please try again later.",
            Self::NetworkError => "Network error. Please check your connection.",
            Self::Unknown => "An unexpected error occurred.",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified request failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{category}: {message}")]
pub struct ApiError {
    pub category: ErrorCategory,
    /// HTTP status, absent when no response was received.
    pub status: Option<u16>,
    pub message: String,
    /// Redirect target carried by the response (402 only).
    pub redirect: Option<String>,
}

impl ApiError {
    /// Error of `category` with no HTTP status.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: None,
            message: message.into(),
            redirect: None,
        }
    }

    /// Attach the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Something the UI layer must do in response to a terminal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Show an error notification.
    Notify {
        category: ErrorCategory,
        message: String,
    },
    /// Show a non-blocking informational notice.
    Notice { message: String },
    /// Full navigation to another surface (pricing/upsell).
    Redirect { target: String },
    /// Session is gone; navigate to the login entry point.
    RedirectToLogin { target: String },
}

/// Navigation targets used by redirect effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destinations<'a> {
    pub login: &'a str,
    /// Upsell target for a 402 whose body names none.
    pub pricing: &'a str,
}

impl Default for Destinations<'static> {
    fn default() -> Self {
        Self {
            login: "/login",
            pricing: "/pricing",
        }
    }
}

/// Executes UI effects. Called exactly once per terminal error.
pub trait EffectSink: Send + Sync + 'static {
    fn apply(&self, effect: &Effect);
}

impl<F> EffectSink for F
where
    F: Fn(&Effect) + Send + Sync + 'static,
{
    fn apply(&self, effect: &Effect) {
        self(effect);
    }
}

/// Sink that only logs; used when no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EffectSink for TracingSink {
    fn apply(&self, effect: &Effect) {
        match effect {
            Effect::Notify { category, message } => {
                tracing::warn!(category = %category, message = %message, "Request failed");
            }
            Effect::Notice { message } => tracing::info!(message = %message, "Notice"),
            Effect::Redirect { target } => tracing::info!(redirect = %target, "Redirect"),
            Effect::RedirectToLogin { target } => {
                tracing::info!(redirect = %target, "Redirect to login");
            }
        }
    }
}

/// Outcome of classifying a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub error: ApiError,
    pub effect: Effect,
}

const GRACE_NOTICE: &str =
    "Your payment is being processed. Full access will be activated in a moment.";

/// Classifies a non-success response.
///
/// `in_grace_period` is only consulted for 402; callers may pass `false` for
/// any other status.
#[must_use]
pub fn classify_response(
    status: u16,
    body: &str,
    in_grace_period: bool,
    destinations: Destinations<'_>,
) -> Classification {
    let category = ErrorCategory::from_status(status);
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(extract_message)
        .unwrap_or_else(|| category.default_message().to_string());

    let mut error = ApiError::new(category, message.clone()).with_status(status);

    let effect = match category {
        ErrorCategory::PaymentRequired => {
            let target = parsed
                .as_ref()
                .and_then(extract_redirect)
                .unwrap_or_else(|| destinations.pricing.to_string());
            error.redirect = Some(target.clone());
            if in_grace_period {
                Effect::Notice {
                    message: GRACE_NOTICE.to_string(),
                }
            } else {
                Effect::Redirect { target }
            }
        }
        ErrorCategory::AuthExpired | ErrorCategory::AuthInvalid => Effect::RedirectToLogin {
            target: destinations.login.to_string(),
        },
        _ => Effect::Notify { category, message },
    };

    Classification { error, effect }
}

/// Classifies a failure where no response was received.
#[must_use]
pub fn classify_network(detail: &str) -> Classification {
    tracing::debug!(detail = %detail, "Network failure");
    let category = ErrorCategory::NetworkError;
    Classification {
        error: ApiError::new(category, category.default_message()),
        effect: Effect::Notify {
            category,
            message: category.default_message().to_string(),
        },
    }
}

/// Classifies an unexpected client-side failure (bad payload, build error).
#[must_use]
pub fn classify_client(detail: &str) -> Classification {
    let category = ErrorCategory::Unknown;
    Classification {
        error: ApiError::new(category, detail),
        effect: Effect::Notify {
            category,
            message: category.default_message().to_string(),
        },
    }
}

/// Classification for a session that could not be recovered.
#[must_use]
pub fn session_ended(detail: &str, login_path: &str) -> Classification {
    Classification {
        error: ApiError::new(ErrorCategory::AuthInvalid, detail).with_status(401),
        effect: Effect::RedirectToLogin {
            target: login_path.to_string(),
        },
    }
}

fn extract_message(body: &JsonValue) -> Option<String> {
    for key in ["detail", "message", "error"] {
        match body.get(key) {
            Some(JsonValue::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(JsonValue::Object(_)) => {
                if let Some(inner) = body.get(key).and_then(extract_message) {
                    return Some(inner);
                }
            }
            // Validation errors: [{"loc": [...], "msg": "..."}]
            Some(JsonValue::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(JsonValue::as_str))
                    .collect();
                if !msgs.is_empty() {
                    return Some(msgs.join("; "));
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_redirect(body: &JsonValue) -> Option<String> {
    for key in ["redirect", "redirect_to", "redirectTo"] {
        if let Some(target) = body.get(key).and_then(JsonValue::as_str) {
            if !target.is_empty() {
                return Some(target.to_string());
            }
        }
    }
    body.get("detail").and_then(extract_redirect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCategory::from_status(422), ErrorCategory::ValidationError);
        assert_eq!(ErrorCategory::from_status(413), ErrorCategory::ValidationError);
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::AuthExpired);
        assert_eq!(ErrorCategory::from_status(402), ErrorCategory::PaymentRequired);
        assert_eq!(ErrorCategory::from_status(403), ErrorCategory::PermissionDenied);
        assert_eq!(ErrorCategory::from_status(404), ErrorCategory::NotFound);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimited);
        assert_eq!(ErrorCategory::from_status(502), ErrorCategory::ServerError);
        assert_eq!(ErrorCategory::from_status(418), ErrorCategory::Unknown);
    }

    #[test]
    fn server_detail_becomes_message() {
        let c = classify_response(400, r#"{"detail":"Unsupported file type"}"#, false, Destinations::default());
        assert_eq!(c.error.message, "Unsupported file type");
        assert_eq!(c.error.status, Some(400));
        assert_eq!(
            c.effect,
            Effect::Notify {
                category: ErrorCategory::ValidationError,
                message: "Unsupported file type".into(),
            }
        );
    }

    #[test]
    fn validation_list_is_joined() {
        let body = r#"{"detail":[{"loc":["body","file"],"msg":"field required"},{"msg":"bad config"}]}"#;
        let c = classify_response(422, body, false, Destinations::default());
        assert_eq!(c.error.message, "field required; bad config");
    }

    #[test]
    fn non_json_body_uses_default_message() {
        let c = classify_response(503, "<html>Bad Gateway</html>", false, Destinations::default());
        assert_eq!(c.error.category, ErrorCategory::ServerError);
        assert_eq!(c.error.message, ErrorCategory::ServerError.default_message());
    }

    #[test]
    fn payment_required_outside_grace_redirects_to_pricing() {
        let c = classify_response(402, "{}", false, Destinations::default());
        assert_eq!(
            c.effect,
            Effect::Redirect {
                target: "/pricing".into()
            }
        );
        assert_eq!(c.error.redirect.as_deref(), Some("/pricing"));
    }

    #[test]
    fn payment_required_uses_body_redirect() {
        let body = r#"{"detail":{"message":"Upgrade","redirect":"/upgrade?plan=pro"}}"#;
        let c = classify_response(402, body, false, Destinations::default());
        assert_eq!(c.error.message, "Upgrade");
        assert_eq!(
            c.effect,
            Effect::Redirect {
                target: "/upgrade?plan=pro".into()
            }
        );
    }

    #[test]
    fn payment_required_in_grace_is_soft_notice() {
        let c = classify_response(402, "{}", true, Destinations::default());
        assert!(matches!(c.effect, Effect::Notice { .. }));
        assert_eq!(c.error.category, ErrorCategory::PaymentRequired);
    }

    #[test]
    fn grace_flag_ignored_for_other_statuses() {
        let c = classify_response(403, "{}", true, Destinations::default());
        assert!(matches!(c.effect, Effect::Notify { .. }));
    }

    #[test]
    fn network_failures_have_no_status() {
        let c = classify_network("connection refused");
        assert_eq!(c.error.category, ErrorCategory::NetworkError);
        assert_eq!(c.error.status, None);
    }

    #[test]
    fn session_end_redirects_to_login() {
        let c = session_ended("refresh rejected", "/signin");
        assert_eq!(c.error.category, ErrorCategory::AuthInvalid);
        assert_eq!(
            c.effect,
            Effect::RedirectToLogin {
                target: "/signin".into()
            }
        );
    }

    #[test]
    fn unauthorized_response_uses_login_destination() {
        let destinations = Destinations {
            login: "/auth/start",
            pricing: "/plans",
        };
        let c = classify_response(401, "{}", false, destinations);
        assert_eq!(
            c.effect,
            Effect::RedirectToLogin {
                target: "/auth/start".into()
            }
        );
        let c = classify_response(402, "{}", false, destinations);
        assert_eq!(
            c.effect,
            Effect::Redirect {
                target: "/plans".into()
            }
        );
    }

    #[test]
    fn closure_sinks_receive_effects() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            move |effect: &Effect| seen.lock().unwrap().push(effect.clone())
        };
        let effect = Effect::RedirectToLogin {
            target: "/login".into(),
        };
        sink.apply(&effect);
        assert_eq!(*seen.lock().unwrap(), vec![effect]);
    }
}
