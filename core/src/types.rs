//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stable, unique identifier for any entity in the ads hierarchy.
pub type EntityId = String;

/// The canonical client identifier.
pub type ClientId = String;

/// Position of an entity in the account → campaign → ad-group → ad hierarchy.
///
/// The declaration order is the output order: every list the engine emits is
/// sorted by level first, then by entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityLevel {
    Account,
    Campaign,
    #[serde(rename = "adgroup")]
    AdGroup,
    Ad,
}

impl EntityLevel {
    pub const ALL: [EntityLevel; 4] = [
        EntityLevel::Account,
        EntityLevel::Campaign,
        EntityLevel::AdGroup,
        EntityLevel::Ad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account  => "account",
            Self::Campaign => "campaign",
            Self::AdGroup  => "adgroup",
            Self::Ad       => "ad",
        }
    }

    /// The level one step down the hierarchy, if any.
    pub fn child(&self) -> Option<EntityLevel> {
        match self {
            Self::Account  => Some(Self::Campaign),
            Self::Campaign => Some(Self::AdGroup),
            Self::AdGroup  => Some(Self::Ad),
            Self::Ad       => None,
        }
    }
}

impl fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account"                       => Ok(Self::Account),
            "campaign"                      => Ok(Self::Campaign),
            "adgroup" | "ad_group" | "adset" => Ok(Self::AdGroup),
            "ad"                            => Ok(Self::Ad),
            other => Err(format!("unknown entity level: {other}")),
        }
    }
}

/// Which conversion counter the client treats as its business outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    #[default]
    Purchase,
    Lead,
    ChatStart,
    Install,
}

impl fmt::Display for ConversionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Purchase  => "purchase",
            Self::Lead      => "lead",
            Self::ChatStart => "chat_start",
            Self::Install   => "install",
        };
        f.write_str(s)
    }
}

/// How aggressively the client wants to grow spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPosture {
    Conservative,
    #[default]
    Stable,
    Aggressive,
}
