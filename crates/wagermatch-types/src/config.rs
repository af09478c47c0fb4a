//! Engine configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{constants, Result, WagerError};

/// How an escrowed match learns its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Both players self-report; complementary reports settle.
    #[default]
    Consensus,
    /// The engine polls the result provider.
    Provider,
}

/// Grace-window generation for negotiation disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraceGeneration {
    /// First-generation rooms: 15 s.
    Legacy,
    /// Current rooms: 90 s.
    Current,
}

impl GraceGeneration {
    #[must_use]
    pub fn window(self) -> Duration {
        match self {
            Self::Legacy => Duration::from_secs(constants::LEGACY_GRACE_SECS),
            Self::Current => Duration::from_secs(constants::DEFAULT_GRACE_SECS),
        }
    }
}

/// Configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Queue floor and lowest negotiable stake.
    pub min_stake: Decimal,
    /// Fraction of the pot kept by the platform, in `[0, 1)`.
    pub commission_rate: Decimal,
    /// Decimal places kept on money amounts.
    pub money_scale: u32,
    /// Consensus self-reports or provider polling.
    pub resolution_mode: ResolutionMode,
    /// Grace window for a negotiation-phase disconnect.
    pub negotiation_grace: Duration,
    /// Result-provider polling interval.
    pub provider_poll_interval: Duration,
    /// Polls before escalating to dispute.
    pub provider_max_attempts: u32,
    /// Delay between settlement commit retries.
    pub settlement_retry_interval: Duration,
    /// Settlement commit retries before parking the session.
    pub settlement_retry_limit: u32,
    /// Capacity of the engine's command channel.
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_stake: Decimal::new(constants::DEFAULT_MIN_STAKE, 0),
            commission_rate: Decimal::new(constants::DEFAULT_COMMISSION_PERCENT, 2),
            money_scale: constants::MONEY_SCALE,
            resolution_mode: ResolutionMode::Consensus,
            negotiation_grace: GraceGeneration::Current.window(),
            provider_poll_interval: Duration::from_millis(constants::DEFAULT_PROVIDER_POLL_MS),
            provider_max_attempts: constants::DEFAULT_PROVIDER_MAX_ATTEMPTS,
            settlement_retry_interval: Duration::from_millis(
                constants::DEFAULT_SETTLEMENT_RETRY_MS,
            ),
            settlement_retry_limit: constants::DEFAULT_SETTLEMENT_RETRY_LIMIT,
            command_buffer: constants::DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builder-style override for the resolution mode.
    #[must_use]
    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.resolution_mode = mode;
        self
    }

    /// Builder-style override for the grace window.
    #[must_use]
    pub fn with_grace(mut self, generation: GraceGeneration) -> Self {
        self.negotiation_grace = generation.window();
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_stake <= Decimal::ZERO {
            return Err(WagerError::Configuration(format!(
                "min_stake must be positive, got {}",
                self.min_stake
            )));
        }
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(WagerError::Configuration(format!(
                "commission_rate must lie in [0, 1), got {}",
                self.commission_rate
            )));
        }
        if self.negotiation_grace.is_zero()
            || self.provider_poll_interval.is_zero()
            || self.settlement_retry_interval.is_zero()
        {
            return Err(WagerError::Configuration(
                "timer intervals must be non-zero".to_string(),
            ));
        }
        if self.provider_max_attempts == 0 {
            return Err(WagerError::Configuration(
                "provider_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.command_buffer == 0 {
            return Err(WagerError::Configuration(
                "command_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
