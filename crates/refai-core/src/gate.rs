//! Which screen a user may see, given their session and subscription

use std::time::{Duration, Instant};

use crate::backend::{AuthSession, SubscriptionStatus};

/// How often the subscription is re-checked while signed in.
pub const SUBSCRIPTION_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// No session: sign in first
    SignIn,
    /// Signed in, first subscription check not answered yet
    Checking,
    /// Signed in without a subscription
    Paywall,
    Chat,
}

impl Gate {
    pub fn resolve(session: Option<&AuthSession>, subscription: &SubscriptionState) -> Self {
        match (session, subscription.status()) {
            (None, _) => Gate::SignIn,
            (Some(_), None) => Gate::Checking,
            (Some(_), Some(status)) if status.subscribed => Gate::Chat,
            (Some(_), Some(_)) => Gate::Paywall,
        }
    }
}

/// Last known subscription status and when to ask again
#[derive(Debug, Clone, Default)]
pub struct SubscriptionState {
    status: Option<SubscriptionStatus>,
    last_checked: Option<Instant>,
    in_flight: bool,
}

impl SubscriptionState {
    pub fn status(&self) -> Option<&SubscriptionStatus> {
        self.status.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.subscribed)
    }

    pub fn is_checking(&self) -> bool {
        self.in_flight
    }

    /// Whether a check should be started at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        if self.in_flight {
            return false;
        }
        match self.last_checked {
            None => true,
            Some(at) => now.duration_since(at) >= SUBSCRIPTION_POLL_INTERVAL,
        }
    }

    pub fn begin_check(&mut self) {
        self.in_flight = true;
    }

    /// Record a check result. A failed check counts as not subscribed.
    pub fn record(&mut self, result: Option<SubscriptionStatus>, now: Instant) {
        self.status = Some(result.unwrap_or_default());
        self.last_checked = Some(now);
        self.in_flight = false;
    }

    /// Forget everything, e.g. on sign-out.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
