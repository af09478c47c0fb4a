//! Money conservation checker.
//!
//! Invariant enforced after every escrow and settlement:
//! ```text
//! Σ(stakes escrowed) == Σ(payouts) + Σ(commission) + Σ(pots still held)
//! ```
//!
//! Money only enters a pot through escrow and only leaves it through a
//! payout or the house commission. If this ever breaks the engine logs an
//! error and refuses to retire the offending session.

use rust_decimal::Decimal;
use wagermatch_types::{Result, WagerError};

use crate::payout::PayoutSplit;

/// Running totals since process start.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PotConservation {
    escrowed: Decimal,
    paid_out: Decimal,
    commission: Decimal,
}

impl PotConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Both stakes of a match entered escrow.
    pub fn record_escrow(&mut self, stake: Decimal) {
        self.escrowed += stake * Decimal::TWO;
    }

    /// A pot left escrow.
    pub fn record_settlement(&mut self, split: &PayoutSplit) {
        self.paid_out += split.payout;
        self.commission += split.commission;
    }

    /// Compare the totals with the value of pots that are still held.
    ///
    /// # Errors
    /// Returns [`WagerError::ConservationViolation`] if the books do not balance.
    pub fn verify(&self, held: Decimal) -> Result<()> {
        let accounted = self.paid_out + self.commission + held;
        if self.escrowed != accounted {
            return Err(WagerError::ConservationViolation {
                reason: format!(
                    "escrowed {} != paid out {} + commission {} + held {held}",
                    self.escrowed, self.paid_out, self.commission
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn total_escrowed(&self) -> Decimal {
        self.escrowed
    }

    #[must_use]
    pub fn total_paid_out(&self) -> Decimal {
        self.paid_out
    }

    #[must_use]
    pub fn total_commission(&self) -> Decimal {
        self.commission
    }
}
