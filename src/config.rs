//! Client configuration: API location, timeouts, navigation targets.

use std::time::Duration;

use url::Url;

use crate::classify::Destinations;
use crate::error::Error;
use crate::grace::DEFAULT_GRACE_PERIOD;

/// Client configuration.
///
/// Required field (`api_url`) is a constructor parameter; everything else has
/// a default and a `with_*` override.
///
/// ```rust,ignore
/// use jobgate::ClientConfig;
///
/// let config = ClientConfig::new("https://api.example.com/api/".parse()?)
///     .with_poll_interval(std::time::Duration::from_secs(5))
///     .with_max_upload_bytes(Some(50 * 1024 * 1024));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) api_url: Url,
    pub(crate) request_timeout: Duration,
    pub(crate) upload_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) grace_period: time::Duration,
    pub(crate) login_path: String,
    pub(crate) pricing_path: String,
    pub(crate) max_upload_bytes: Option<u64>,
}

impl ClientConfig {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

    /// Create config for the API at `api_url` with default timeouts and paths.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url: with_trailing_slash(api_url),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: Self::DEFAULT_UPLOAD_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            login_path: "/login".into(),
            pricing_path: "/pricing".into(),
            max_upload_bytes: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `JOBGATE_API_URL`: API base URL
    ///
    /// # Optional env vars
    /// - `JOBGATE_REQUEST_TIMEOUT_SECS`
    /// - `JOBGATE_UPLOAD_TIMEOUT_SECS`
    /// - `JOBGATE_POLL_INTERVAL_MS`
    /// - `JOBGATE_GRACE_PERIOD_SECS`
    /// - `JOBGATE_LOGIN_PATH`
    /// - `JOBGATE_PRICING_PATH`
    /// - `JOBGATE_MAX_UPLOAD_BYTES`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API URL is missing or any value fails
    /// to parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_url = lookup("JOBGATE_API_URL")
            .ok_or_else(|| Error::Config("JOBGATE_API_URL is required".into()))?;
        let api_url: Url = api_url
            .parse()
            .map_err(|e| Error::Config(format!("JOBGATE_API_URL: {e}")))?;

        let mut config = Self::new(api_url);

        if let Some(secs) = parse_var::<u64>(&lookup, "JOBGATE_REQUEST_TIMEOUT_SECS")? {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "JOBGATE_UPLOAD_TIMEOUT_SECS")? {
            config = config.with_upload_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "JOBGATE_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(Error::Config("JOBGATE_POLL_INTERVAL_MS must be positive".into()));
            }
            config = config.with_poll_interval(Duration::from_millis(ms));
        }
        if let Some(secs) = parse_var::<i64>(&lookup, "JOBGATE_GRACE_PERIOD_SECS")? {
            config = config.with_grace_period(time::Duration::seconds(secs));
        }
        if let Some(path) = lookup("JOBGATE_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Some(path) = lookup("JOBGATE_PRICING_PATH") {
            config = config.with_pricing_path(path);
        }
        if let Some(bytes) = parse_var::<u64>(&lookup, "JOBGATE_MAX_UPLOAD_BYTES")? {
            config = config.with_max_upload_bytes(Some(bytes));
        }

        Ok(config)
    }

    /// Override the timeout applied to every API request.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the timeout for file uploads.
    #[must_use]
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Override the job status polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the window after a payment success during which a 402 is soft.
    #[must_use]
    pub fn with_grace_period(mut self, grace: time::Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Override the login entry point used when a session ends.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Override the upsell target for a 402 that names none.
    #[must_use]
    pub fn with_pricing_path(mut self, path: impl Into<String>) -> Self {
        self.pricing_path = path.into();
        self
    }

    /// Plan-specific upload ceiling, checked locally before sending.
    #[must_use]
    pub fn with_max_upload_bytes(mut self, bytes: Option<u64>) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// API base URL, always ending in `/`.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Timeout applied to every API request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Timeout for file uploads.
    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }

    /// Job status polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Payment grace window.
    #[must_use]
    pub fn grace_period(&self) -> time::Duration {
        self.grace_period
    }

    /// Login entry point.
    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Default upsell target.
    #[must_use]
    pub fn pricing_path(&self) -> &str {
        &self.pricing_path
    }

    /// Local upload ceiling, if any.
    #[must_use]
    pub fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_bytes
    }

    /// Navigation targets for redirect effects.
    #[must_use]
    pub fn destinations(&self) -> Destinations<'_> {
        Destinations {
            login: &self.login_path,
            pricing: &self.pricing_path,
        }
    }

    /// Resolve an API path (`"jobs"`, `"auth/refresh"`) against the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid endpoint {path}: {e}")))
    }

    /// Like [`endpoint`](Self::endpoint) with one percent-encoded trailing segment.
    pub(crate) fn endpoint_with_segment(&self, path: &str, segment: &str) -> Result<Url, Error> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API URL cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::new("https://api.example.com".parse().unwrap());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.grace_period(), time::Duration::days(3));
        assert_eq!(config.login_path(), "/login");
        assert_eq!(config.pricing_path(), "/pricing");
        assert!(config.max_upload_bytes().is_none());
    }

    #[test]
    fn endpoints_keep_base_path() {
        let config = ClientConfig::new("https://example.com/api".parse().unwrap());
        assert_eq!(
            config.endpoint("/auth/refresh").unwrap().as_str(),
            "https://example.com/api/auth/refresh"
        );
        assert_eq!(
            config.endpoint_with_segment("jobs", "a b/c").unwrap().as_str(),
            "https://example.com/api/jobs/a%20b%2Fc"
        );
    }

    #[test]
    fn from_env_requires_api_url() {
        let result = ClientConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("JOBGATE_API_URL")));
    }

    #[test]
    fn from_env_applies_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("JOBGATE_API_URL", "http://localhost:8000/"),
            ("JOBGATE_POLL_INTERVAL_MS", "500"),
            ("JOBGATE_GRACE_PERIOD_SECS", "3600"),
            ("JOBGATE_PRICING_PATH", "/upgrade"),
            ("JOBGATE_MAX_UPLOAD_BYTES", "1048576"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.grace_period(), time::Duration::hours(1));
        assert_eq!(config.pricing_path(), "/upgrade");
        assert_eq!(config.max_upload_bytes(), Some(1_048_576));
    }

    #[test]
    fn login_path_feeds_destinations() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("JOBGATE_API_URL", "http://localhost:8000/"),
            ("JOBGATE_LOGIN_PATH", "/signin"),
        ]))
        .unwrap();
        assert_eq!(
            config.destinations(),
            Destinations {
                login: "/signin",
                pricing: "/pricing",
            }
        );
    }

    #[test]
    fn from_env_rejects_bad_numbers() {
        let result = ClientConfig::from_lookup(lookup(&[
            ("JOBGATE_API_URL", "http://localhost:8000/"),
            ("JOBGATE_REQUEST_TIMEOUT_SECS", "soon"),
        ]));
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("JOBGATE_REQUEST_TIMEOUT_SECS")));
    }

    #[test]
    fn from_env_rejects_zero_interval() {
        let result = ClientConfig::from_lookup(lookup(&[
            ("JOBGATE_API_URL", "http://localhost:8000/"),
            ("JOBGATE_POLL_INTERVAL_MS", "0"),
        ]))
        .map(|_| ());
        assert!(result.is_err());
    }
}
