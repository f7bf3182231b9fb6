//! Grace period after a successful checkout.
//!
//! Between the moment a payment succeeds in the browser and the moment the
//! billing webhook updates the subscription record, the backend still reports
//! "no active plan". The gate lets callers treat that window as paid.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::storage::JsonFile;
use crate::types::PaymentEvent;

/// Default window after a payment success.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::days(3);

/// Source of "now". Swapped out in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Persistence for the single payment-event timestamp.
pub trait PaymentEventStore: Send + Sync + 'static {
    fn load(&self) -> Result<Option<PaymentEvent>, Error>;
    fn save(&self, event: PaymentEvent) -> Result<(), Error>;
    fn clear(&self) -> Result<(), Error>;
}

#[derive(Debug, Default)]
pub struct MemoryPaymentEventStore {
    inner: RwLock<Option<PaymentEvent>>,
}

impl MemoryPaymentEventStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaymentEventStore for MemoryPaymentEventStore {
    fn load(&self) -> Result<Option<PaymentEvent>, Error> {
        self.inner
            .read()
            .map(|guard| *guard)
            .map_err(|_| Error::Storage("payment event lock poisoned".into()))
    }

    fn save(&self, event: PaymentEvent) -> Result<(), Error> {
        *self
            .inner
            .write()
            .map_err(|_| Error::Storage("payment event lock poisoned".into()))? = Some(event);
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        *self
            .inner
            .write()
            .map_err(|_| Error::Storage("payment event lock poisoned".into()))? = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FilePaymentEventStore {
    file: JsonFile,
}

impl FilePaymentEventStore {
    /// Store backed by the JSON file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl PaymentEventStore for FilePaymentEventStore {
    fn load(&self) -> Result<Option<PaymentEvent>, Error> {
        self.file.load()
    }

    fn save(&self, event: PaymentEvent) -> Result<(), Error> {
        self.file.store(&event)
    }

    fn clear(&self) -> Result<(), Error> {
        self.file.remove()
    }
}

/// `true` iff `now - occurred_at < grace`. Exactly `grace` is expired.
#[must_use]
pub fn within_grace(occurred_at: OffsetDateTime, now: OffsetDateTime, grace: Duration) -> bool {
    now - occurred_at < grace
}

/// Read-only predicate over the stored payment event.
#[derive(Clone)]
pub struct GracePeriodGate {
    store: Arc<dyn PaymentEventStore>,
    clock: Arc<dyn Clock>,
    grace: Duration,
}

impl std::fmt::Debug for GracePeriodGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GracePeriodGate")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl Default for GracePeriodGate {
    fn default() -> Self {
        Self::new(Arc::new(MemoryPaymentEventStore::new()))
    }
}

impl GracePeriodGate {
    /// Gate over `store` with the system clock and the default window.
    #[must_use]
    pub fn new(store: Arc<dyn PaymentEventStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            grace: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Override the grace window.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Override the clock (for tests).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The grace window.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// Whether the latest payment event is inside the window right now.
    pub fn is_in_grace_period(&self) -> bool {
        self.is_in_grace_period_at(self.clock.now())
    }

    /// A store read failure counts as "no grace": the hard gate applies.
    pub fn is_in_grace_period_at(&self, now: OffsetDateTime) -> bool {
        match self.store.load() {
            Ok(Some(event)) => within_grace(event.occurred_at, now, self.grace),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read payment event");
                false
            }
        }
    }

    /// Time left in the window, `None` when not in grace.
    pub fn remaining(&self) -> Option<Duration> {
        let now = self.clock.now();
        let event = self.store.load().ok().flatten()?;
        within_grace(event.occurred_at, now, self.grace)
            .then(|| self.grace - (now - event.occurred_at))
    }
}

/// Records a payment success at the clock's current time.
///
/// This is the only writer of the payment event; call it from the checkout
/// success handler.
pub fn record_payment_success(
    store: &dyn PaymentEventStore,
    clock: &dyn Clock,
) -> Result<PaymentEvent, Error> {
    let event = PaymentEvent {
        occurred_at: clock.now(),
    };
    store.save(event)?;
    tracing::info!(occurred_at = %event.occurred_at, "Payment success recorded");
    Ok(event)
}
