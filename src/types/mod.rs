pub mod event;

use std::{collections::BTreeMap, fmt};

use alloy_primitives::U256;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

pub type ChainId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    Standard,
    Simple,
    EnsGuardian,
    DataWeaver,
    SocialArchitect,
    OracleSeer,
    GovernanceGuardian,
}

impl Variant {
    pub const ALL: [Variant; 7] = [
        Variant::Standard,
        Variant::Simple,
        Variant::EnsGuardian,
        Variant::DataWeaver,
        Variant::SocialArchitect,
        Variant::OracleSeer,
        Variant::GovernanceGuardian,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Standard => "Standard",
            Variant::Simple => "Simple",
            Variant::EnsGuardian => "EnsGuardian",
            Variant::DataWeaver => "DataWeaver",
            Variant::SocialArchitect => "SocialArchitect",
            Variant::OracleSeer => "OracleSeer",
            Variant::GovernanceGuardian => "GovernanceGuardian",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PioneerType {
    Explorer = 0,
    Builder = 1,
    Guardian = 2,
    Architect = 3,
    Oracle = 4,
    Weaver = 5,
    Governor = 6,
}

impl PioneerType {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(PioneerType::Explorer),
            1 => Ok(PioneerType::Builder),
            2 => Ok(PioneerType::Guardian),
            3 => Ok(PioneerType::Architect),
            4 => Ok(PioneerType::Oracle),
            5 => Ok(PioneerType::Weaver),
            6 => Ok(PioneerType::Governor),
            _ => bail!("Unsupported pioneer type: {}", byte),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionValue {
    Uint(U256),
    Text(String),
}

impl ExtensionValue {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            ExtensionValue::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ExtensionValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// Pioneer data normalized across all contract variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PioneerRecord {
    pub token_id: Option<U256>,
    pub pioneer_type: PioneerType,
    pub name: String,
    pub title: String,
    pub realm: String,
    pub rarity: u8,
    // Unix seconds
    pub minted_at: u64,
    pub is_active: bool,
    pub extensions: BTreeMap<String, ExtensionValue>,
}

impl PioneerRecord {
    pub fn extension(&self, field: &str) -> Option<&ExtensionValue> {
        self.extensions.get(field)
    }
}

/// What the UI shows for a (chain, player) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PioneerStatus {
    pub has_pioneer: bool,
    pub record: Option<PioneerRecord>,
    pub minting_available: bool,
    pub total_supply: U256,
}
