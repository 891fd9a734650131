//! Account and plan status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plan identifier assigned by billing (e.g. `trial`, `basico`, `pro`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Plan(String);

impl Plan {
    /// Plan identifier used while a store is evaluating the product.
    pub const TRIAL: &'static str = "trial";

    /// Create a plan from its identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the plan identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the trial plan.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::TRIAL)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Billing state of a store as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentState {
    /// Whether the store has paid for the current period.
    pub paid: bool,
    /// Current plan.
    pub plan: Plan,
    /// End of the trial window, when the backend reports one.
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// What the engine is allowed to do on a store's page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Paid store: hydrate and edit normally.
    Active,
    /// Unpaid store inside its trial window: hydrate and edit normally.
    Trial,
    /// Unpaid store outside its trial window: render only the banner.
    Suspended,
}

impl AccountStatus {
    /// Whether hydration and editing may run.
    #[must_use]
    pub const fn is_operational(self) -> bool {
        !matches!(self, Self::Suspended)
    }
}

impl PaymentState {
    /// Classify the store at instant `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> AccountStatus {
        if self.paid {
            return AccountStatus::Active;
        }
        if !self.plan.is_trial() {
            return AccountStatus::Suspended;
        }
        match self.trial_ends_at {
            Some(ends) if ends <= now => AccountStatus::Suspended,
            _ => AccountStatus::Trial,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn state(paid: bool, plan: &str, trial_ends_at: Option<DateTime<Utc>>) -> PaymentState {
        PaymentState {
            paid,
            plan: Plan::new(plan),
            trial_ends_at,
        }
    }

    #[test]
    fn test_paid_store_is_active() {
        assert_eq!(state(true, "pro", None).status(Utc::now()), AccountStatus::Active);
    }

    #[test]
    fn test_unpaid_non_trial_is_suspended() {
        let status = state(false, "pro", None).status(Utc::now());
        assert_eq!(status, AccountStatus::Suspended);
        assert!(!status.is_operational());
    }

    #[test]
    fn test_trial_window() {
        let now = Utc::now();
        assert_eq!(
            state(false, "trial", Some(now + Duration::days(3))).status(now),
            AccountStatus::Trial
        );
        assert_eq!(
            state(false, "TRIAL", None).status(now),
            AccountStatus::Trial
        );
        assert_eq!(
            state(false, "trial", Some(now - Duration::days(1))).status(now),
            AccountStatus::Suspended
        );
    }
}
