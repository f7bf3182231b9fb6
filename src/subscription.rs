//! Subscription snapshot and page-level access decisions.

use crate::grace::GracePeriodGate;
use crate::types::SubscriptionSnapshot;

/// Outcome of a page-level access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// The subscription record shows a paid plan.
    Granted,
    /// No paid plan on record yet, but a payment succeeded recently.
    GracePeriod,
    /// Send the user to `redirect`.
    Denied { redirect: String },
}

impl Access {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }
}

/// Decide whether paid functionality is accessible.
///
/// The snapshot is authoritative except inside the grace window, which
/// covers the gap between checkout and the billing webhook.
#[must_use]
pub fn access_decision(
    snapshot: Option<&SubscriptionSnapshot>,
    gate: &GracePeriodGate,
    pricing_path: &str,
) -> Access {
    if snapshot.is_some_and(|s| s.status.is_paid()) {
        return Access::Granted;
    }
    if gate.is_in_grace_period() {
        tracing::debug!("No paid plan on record; grace period active");
        return Access::GracePeriod;
    }
    Access::Denied {
        redirect: pricing_path.to_string(),
    }
}

#[cfg(feature = "http")]
mod api {
    use super::{Access, access_decision};
    use crate::error::Error;
    use crate::transport::ApiClient;
    use crate::types::SubscriptionSnapshot;

    impl ApiClient {
        /// `GET /subscription`.
        ///
        /// # Errors
        ///
        /// Classified transport errors; see [`ApiClient::send`].
        pub async fn subscription(&self) -> Result<SubscriptionSnapshot, Error> {
            self.get_json("subscription").await
        }

        /// Fetch the subscription and apply [`access_decision`].
        ///
        /// # Errors
        ///
        /// Classified transport errors; the effect for them has already been
        /// applied, so the caller should not redirect again.
        pub async fn check_access(&self) -> Result<Access, Error> {
            let snapshot = self.subscription().await?;
            Ok(access_decision(
                Some(&snapshot),
                self.grace_gate(),
                self.config().pricing_path(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::grace::tests::FixedClock;
    use crate::grace::{MemoryPaymentEventStore, PaymentEventStore};
    use crate::types::{PaymentEvent, SubscriptionStatus};

    fn gate(payment_age: Option<Duration>) -> GracePeriodGate {
        let now = datetime!(2026-10-10 12:00 UTC);
        let store = Arc::new(MemoryPaymentEventStore::new());
        if let Some(age) = payment_age {
            store
                .save(PaymentEvent {
                    occurred_at: now - age,
                })
                .unwrap();
        }
        GracePeriodGate::new(store).with_clock(FixedClock::at(now))
    }

    #[test]
    fn active_plan_is_granted() {
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Active);
        assert_eq!(access_decision(Some(&snap), &gate(None), "/pricing"), Access::Granted);
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Trialing);
        assert_eq!(access_decision(Some(&snap), &gate(None), "/pricing"), Access::Granted);
    }

    #[test]
    fn inactive_plan_in_grace_is_allowed() {
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Incomplete);
        let access = access_decision(Some(&snap), &gate(Some(Duration::hours(2))), "/pricing");
        assert_eq!(access, Access::GracePeriod);
        assert!(access.is_allowed());
    }

    #[test]
    fn missing_plan_after_grace_is_denied() {
        let access = access_decision(None, &gate(Some(Duration::days(4))), "/pricing");
        assert_eq!(
            access,
            Access::Denied {
                redirect: "/pricing".into()
            }
        );
        assert!(!access.is_allowed());
    }

    #[test]
    fn canceled_without_payment_is_denied() {
        let snap = SubscriptionSnapshot::new(SubscriptionStatus::Canceled);
        assert!(!access_decision(Some(&snap), &gate(None), "/upgrade").is_allowed());
    }
}
