//! War type policies
//!
//! Reference data owned by another part of the platform. The engine only
//! looks policies up through [`WarTypeCatalog`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Points a war type pays out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarTypePolicy {
    /// War type ID
    pub war_type_id: u32,

    /// Display name
    pub name: String,

    /// Base reward for the winner
    pub base_winner_points: u32,

    /// Base penalty for the loser
    pub base_loser_points: u32,

    /// Reward for each side of a draw
    #[serde(default = "default_draw_points")]
    pub draw_points: u32,
}

fn default_draw_points() -> u32 {
    25
}

/// Lookup of war type policies
pub trait WarTypeCatalog: Send + Sync {
    /// Policy for a war type, if it exists
    fn policy(&self, war_type_id: u32) -> Option<WarTypePolicy>;
}

/// In-memory catalog, usually built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticWarTypes {
    policies: HashMap<u32, WarTypePolicy>,
}

impl StaticWarTypes {
    /// Build from a list; a later duplicate id replaces an earlier one
    pub fn new(policies: impl IntoIterator<Item = WarTypePolicy>) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|policy| (policy.war_type_id, policy))
                .collect(),
        }
    }

    /// Number of war types
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// No war types configured
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl WarTypeCatalog for StaticWarTypes {
    fn policy(&self, war_type_id: u32) -> Option<WarTypePolicy> {
        self.policies.get(&war_type_id).cloned()
    }
}

/// War types shipped with the default configuration
pub fn default_war_types() -> Vec<WarTypePolicy> {
    vec![
        WarTypePolicy {
            war_type_id: 1,
            name: "Skirmish".to_string(),
            base_winner_points: 100,
            base_loser_points: 20,
            draw_points: 15,
        },
        WarTypePolicy {
            war_type_id: 2,
            name: "Standard War".to_string(),
            base_winner_points: 200,
            base_loser_points: 30,
            draw_points: 25,
        },
        WarTypePolicy {
            war_type_id: 3,
            name: "Siege".to_string(),
            base_winner_points: 400,
            base_loser_points: 60,
            draw_points: 50,
        },
    ]
}
