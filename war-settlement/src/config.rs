//! Configuration for settlement engine

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::calculator::ScoringRules;
use crate::policy::{default_war_types, WarTypePolicy};

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Ledger store configuration
    pub ledger: clan_ledger::Config,

    /// Settlement configuration
    pub settlement: SettlementConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "war-settlement".to_string(),
            ledger: clan_ledger::Config::default(),
            settlement: SettlementConfig::default(),
        }
    }
}

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Attempts per request when the store reports contention
    pub max_attempts: u32,

    /// Scoring constants
    pub scoring: ScoringRules,

    /// War types known to the engine
    pub war_types: Vec<WarTypePolicy>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            scoring: ScoringRules::default(),
            war_types: default_war_types(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            ledger: clan_ledger::Config::from_env()?,
            ..Config::default()
        };

        if let Ok(attempts) = std::env::var("CLAN_LEDGER_MAX_ATTEMPTS") {
            config.settlement.max_attempts = attempts
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid max attempts: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        self.ledger.validate()?;

        if self.settlement.max_attempts == 0 {
            return Err(crate::Error::Config("max_attempts must be at least 1".to_string()));
        }

        self.settlement.scoring.validate().map_err(crate::Error::Config)?;

        let mut seen = HashSet::new();
        for policy in &self.settlement.war_types {
            if !seen.insert(policy.war_type_id) {
                return Err(crate::Error::Config(format!(
                    "duplicate war type {}",
                    policy.war_type_id
                )));
            }
            if policy.draw_points == 0 {
                return Err(crate::Error::Config(format!(
                    "war type {} must pay a positive draw reward",
                    policy.war_type_id
                )));
            }
        }

        Ok(())
    }
}
