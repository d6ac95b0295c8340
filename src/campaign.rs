//! Ad campaign metrics and the prepaid wallet that funds them
//!
//! Amounts are integer cents; ratios are computed in currency units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Smallest campaign budget, in cents
pub const MIN_BUDGET_CENTS: u64 = 100;
/// Largest campaign budget, in cents
pub const MAX_BUDGET_CENTS: u64 = 10_000;
/// Largest single wallet top-up, in cents
pub const MAX_TOP_UP_CENTS: u64 = 10_000;

fn units(cents: u64) -> f64 {
    cents as f64 / 100.0
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("top-up of {requested} cents exceeds the {max} cent limit")]
    TopUpTooLarge { requested: u64, max: u64 },

    #[error("insufficient balance: {balance} cents available, {requested} requested")]
    InsufficientBalance { balance: u64, requested: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CampaignError {
    #[error("budget of {0} cents is outside 100..=10000")]
    BudgetOutOfRange(u64),

    #[error("campaign name must not be blank")]
    BlankName,

    #[error("cannot {action} a {status:?} campaign")]
    InvalidTransition {
        action: &'static str,
        status: CampaignStatus,
    },

    #[error("spend of {requested} cents would exceed the remaining budget of {remaining}")]
    BudgetExceeded { requested: u64, remaining: u64 },

    #[error(transparent)]
    Wallet(#[from] WalletError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    balance_cents: u64,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(balance_cents: u64) -> Self {
        Self { balance_cents }
    }

    pub fn balance_cents(&self) -> u64 {
        self.balance_cents
    }

    pub fn add_funds(&mut self, cents: u64) -> Result<(), WalletError> {
        if cents == 0 {
            return Err(WalletError::NonPositiveAmount);
        }
        self.balance_cents = self.balance_cents.saturating_add(cents);
        Ok(())
    }

    /// A customer payment; capped per transaction
    pub fn top_up(&mut self, cents: u64) -> Result<(), WalletError> {
        if cents > MAX_TOP_UP_CENTS {
            return Err(WalletError::TopUpTooLarge {
                requested: cents,
                max: MAX_TOP_UP_CENTS,
            });
        }
        self.add_funds(cents)?;
        info!("Wallet topped up by {} cents", cents);
        Ok(())
    }

    pub fn deduct_funds(&mut self, cents: u64) -> Result<(), WalletError> {
        if cents == 0 {
            return Err(WalletError::NonPositiveAmount);
        }
        if cents > self.balance_cents {
            return Err(WalletError::InsufficientBalance {
                balance: self.balance_cents,
                requested: cents,
            });
        }
        self.balance_cents -= cents;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    #[default]
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub product_link: String,
    pub description: String,
    pub budget_cents: u64,
    pub spent_cents: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        name: &str,
        product_link: &str,
        description: &str,
        budget_cents: u64,
    ) -> Result<Self, CampaignError> {
        if name.trim().is_empty() {
            return Err(CampaignError::BlankName);
        }
        if !(MIN_BUDGET_CENTS..=MAX_BUDGET_CENTS).contains(&budget_cents) {
            return Err(CampaignError::BudgetOutOfRange(budget_cents));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            product_link: product_link.to_string(),
            description: description.to_string(),
            budget_cents,
            spent_cents: 0,
            clicks: 0,
            conversions: 0,
            status: CampaignStatus::Running,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create a running campaign and charge its budget to `wallet`
    ///
    /// The wallet is left untouched if the campaign is invalid.
    pub fn launch(
        wallet: &mut Wallet,
        name: &str,
        product_link: &str,
        description: &str,
        budget_cents: u64,
    ) -> Result<Self, CampaignError> {
        let campaign = Self::new(name, product_link, description, budget_cents)?;
        wallet.deduct_funds(budget_cents)?;
        info!("Launched campaign '{}' with {} cents", campaign.name, budget_cents);
        Ok(campaign)
    }

    /// Spend divided by conversions, in currency units; 0 with no conversions
    pub fn cost_per_conversion(&self) -> f64 {
        if self.conversions == 0 {
            0.0
        } else {
            units(self.spent_cents) / self.conversions as f64
        }
    }

    /// `(conversions - spent) / spent`, spent in currency units; 0 when
    /// nothing was spent
    pub fn roi(&self) -> f64 {
        if self.spent_cents == 0 {
            return 0.0;
        }
        let spent = units(self.spent_cents);
        (self.conversions as f64 - spent) / spent
    }

    pub fn remaining_cents(&self) -> u64 {
        self.budget_cents.saturating_sub(self.spent_cents)
    }

    pub fn record_spend(&mut self, cents: u64) -> Result<(), CampaignError> {
        let remaining = self.remaining_cents();
        if cents > remaining {
            return Err(CampaignError::BudgetExceeded {
                requested: cents,
                remaining,
            });
        }
        self.spent_cents += cents;
        self.touch();
        Ok(())
    }

    pub fn record_clicks(&mut self, clicks: u64) {
        self.clicks = self.clicks.saturating_add(clicks);
        self.touch();
    }

    pub fn record_conversions(&mut self, conversions: u64) {
        self.conversions = self.conversions.saturating_add(conversions);
        self.touch();
    }

    pub fn pause(&mut self) -> Result<(), CampaignError> {
        self.transition("pause", CampaignStatus::Running, CampaignStatus::Paused)
    }

    pub fn resume(&mut self) -> Result<(), CampaignError> {
        self.transition("resume", CampaignStatus::Paused, CampaignStatus::Running)
    }

    pub fn complete(&mut self) -> Result<(), CampaignError> {
        if self.status == CampaignStatus::Completed {
            return Err(CampaignError::InvalidTransition {
                action: "complete",
                status: self.status,
            });
        }
        self.status = CampaignStatus::Completed;
        self.touch();
        Ok(())
    }

    fn transition(
        &mut self,
        action: &'static str,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<(), CampaignError> {
        if self.status != from {
            return Err(CampaignError::InvalidTransition {
                action,
                status: self.status,
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign(budget_cents: u64) -> Campaign {
        Campaign::new("Kettle push", "https://shop.example/dp/1", "", budget_cents).unwrap()
    }

    #[test]
    fn budget_must_be_between_one_and_one_hundred() {
        assert!(Campaign::new("a", "l", "d", 100).is_ok());
        assert!(Campaign::new("a", "l", "d", 10_000).is_ok());
        assert_eq!(
            Campaign::new("a", "l", "d", 99).unwrap_err(),
            CampaignError::BudgetOutOfRange(99)
        );
        assert!(Campaign::new("a", "l", "d", 10_001).is_err());
        assert_eq!(
            Campaign::new(" ", "l", "d", 500).unwrap_err(),
            CampaignError::BlankName
        );
    }

    #[test]
    fn ratios_are_zero_before_activity() {
        let c = campaign(5_000);
        assert_eq!(c.roi(), 0.0);
        assert_eq!(c.cost_per_conversion(), 0.0);
    }

    #[test]
    fn ratios_follow_spend_and_conversions() {
        let mut c = campaign(5_000);
        c.record_spend(2_000).unwrap();
        c.record_conversions(4);
        c.record_clicks(120);

        assert_eq!(c.cost_per_conversion(), 5.0);
        assert_eq!(c.roi(), (4.0 - 20.0) / 20.0);
        assert_eq!(c.remaining_cents(), 3_000);
        assert_eq!(
            c.record_spend(3_001).unwrap_err(),
            CampaignError::BudgetExceeded {
                requested: 3_001,
                remaining: 3_000
            }
        );
    }

    #[test]
    fn completed_campaigns_cannot_resume() {
        let mut c = campaign(1_000);
        c.pause().unwrap();
        assert_eq!(c.status, CampaignStatus::Paused);
        assert!(c.pause().is_err());
        c.resume().unwrap();
        c.complete().unwrap();
        assert!(matches!(
            c.resume(),
            Err(CampaignError::InvalidTransition {
                action: "resume",
                status: CampaignStatus::Completed
            })
        ));
    }

    #[test]
    fn wallet_rejects_zero_oversized_and_overdrawn_amounts() {
        let mut wallet = Wallet::new();
        assert_eq!(wallet.add_funds(0), Err(WalletError::NonPositiveAmount));
        assert!(matches!(
            wallet.top_up(10_001),
            Err(WalletError::TopUpTooLarge { .. })
        ));

        wallet.top_up(10_000).unwrap();
        assert_eq!(wallet.balance_cents(), 10_000);
        assert_eq!(
            wallet.deduct_funds(10_001),
            Err(WalletError::InsufficientBalance {
                balance: 10_000,
                requested: 10_001
            })
        );
        wallet.deduct_funds(2_500).unwrap();
        assert_eq!(wallet.balance_cents(), 7_500);
    }

    #[test]
    fn launch_charges_the_wallet_only_when_valid() {
        let mut wallet = Wallet::with_balance(3_000);

        assert!(Campaign::launch(&mut wallet, "x", "l", "d", 50).is_err());
        assert_eq!(wallet.balance_cents(), 3_000);

        let err = Campaign::launch(&mut wallet, "x", "l", "d", 5_000).unwrap_err();
        assert!(matches!(
            err,
            CampaignError::Wallet(WalletError::InsufficientBalance { .. })
        ));

        let c = Campaign::launch(&mut wallet, "x", "l", "d", 2_000).unwrap();
        assert_eq!(c.status, CampaignStatus::Running);
        assert_eq!(wallet.balance_cents(), 1_000);
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&CampaignStatus::Running).unwrap(),
            "\"RUNNING\""
        );
    }
}
