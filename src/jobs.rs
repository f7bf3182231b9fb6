//! Job endpoints and the [`JobSource`] seam used by the poller.

use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::types::{Job, JobId};

/// Anything that can fetch the latest snapshot of a job.
///
/// Fetches must be idempotent and side-effect free; the poller calls this
/// repeatedly.
pub trait JobSource: Send + Sync + 'static {
    fn fetch_job(&self, id: &JobId) -> impl Future<Output = Result<Job, Error>> + Send;
}

impl<T: JobSource> JobSource for Arc<T> {
    fn fetch_job(&self, id: &JobId) -> impl Future<Output = Result<Job, Error>> + Send {
        (**self).fetch_job(id)
    }
}

#[cfg(feature = "http")]
mod api {
    use super::JobSource;
    use crate::error::Error;
    use crate::polling::JobPoller;
    use crate::transport::ApiClient;
    use crate::types::{Job, JobId};

    impl ApiClient {
        /// `GET /jobs/{id}`.
        ///
        /// # Errors
        ///
        /// Classified transport errors; see [`ApiClient::send`].
        pub async fn get_job(&self, id: &JobId) -> Result<Job, Error> {
            let url = self.config().endpoint_with_segment("jobs", id.as_str())?;
            let response = self.send(|http| Ok(http.get(url.clone()))).await?;
            self.decode(response).await
        }

        /// `GET /jobs`: the user's jobs, newest first as returned by the server.
        ///
        /// # Errors
        ///
        /// Classified transport errors; see [`ApiClient::send`].
        pub async fn list_jobs(&self) -> Result<Vec<Job>, Error> {
            self.get_json("jobs").await
        }

        /// A poller over this client using the configured interval.
        #[must_use]
        pub fn poller(&self) -> JobPoller<ApiClient> {
            JobPoller::new(self.clone()).with_interval(self.config().poll_interval())
        }
    }

    impl JobSource for ApiClient {
        async fn fetch_job(&self, id: &JobId) -> Result<Job, Error> {
            self.get_job(id).await
        }
    }
}
