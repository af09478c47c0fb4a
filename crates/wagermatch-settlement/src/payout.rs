//! Pot, commission and payout arithmetic.
//!
//! ```text
//! pot        = stake × 2
//! commission = round_toward_zero(pot × rate, scale)
//! payout     = pot − commission
//! ```
//!
//! Payout is derived by subtraction, so `pot == payout + commission` holds
//! exactly for every stake and rate. The commission is further split into
//! two value-generated shares (one per participant, independent of who
//! won); the first share rounds toward zero and the second takes the
//! remainder.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use wagermatch_types::{Result, WagerError};

/// Money movement for one settled match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutSplit {
    pub stake: Decimal,
    pub pot: Decimal,
    pub commission: Decimal,
    pub payout: Decimal,
    /// Commission attributed to each seat for lifetime-value tracking.
    pub value_shares: [Decimal; 2],
}

impl PayoutSplit {
    /// # Errors
    /// `StakeOutOfRange` for a non-positive stake, `Configuration` for a
    /// rate outside `[0, 1)`.
    pub fn compute(stake: Decimal, rate: Decimal, scale: u32) -> Result<Self> {
        if stake <= Decimal::ZERO {
            return Err(WagerError::StakeOutOfRange {
                stake,
                min: Decimal::ZERO,
                max: Decimal::MAX,
            });
        }
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(WagerError::Configuration(format!(
                "commission rate {rate} outside [0, 1)"
            )));
        }

        let pot = stake * Decimal::TWO;
        let commission = (pot * rate).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        let payout = pot - commission;
        let first_share =
            (commission / Decimal::TWO).round_dp_with_strategy(scale, RoundingStrategy::ToZero);
        let split = Self {
            stake,
            pot,
            commission,
            payout,
            value_shares: [first_share, commission - first_share],
        };
        split.check_conservation()?;
        Ok(split)
    }

    /// Both stakes must equal payout plus commission, and the value shares
    /// must add up to the commission.
    ///
    /// # Errors
    /// Returns `ConservationViolation` when either identity fails.
    pub fn check_conservation(&self) -> Result<()> {
        if self.stake + self.stake != self.payout + self.commission {
            return Err(WagerError::ConservationViolation {
                reason: format!(
                    "stakes {} + {} != payout {} + commission {}",
                    self.stake, self.stake, self.payout, self.commission
                ),
            });
        }
        if self.value_shares[0] + self.value_shares[1] != self.commission {
            return Err(WagerError::ConservationViolation {
                reason: format!(
                    "value shares {:?} do not sum to commission {}",
                    self.value_shares, self.commission
                ),
            });
        }
        if self.payout < Decimal::ZERO || self.commission < Decimal::ZERO {
            return Err(WagerError::ConservationViolation {
                reason: "negative payout or commission".to_string(),
            });
        }
        Ok(())
    }
}
