use std::collections::BTreeMap;

use alloy_primitives::U256;
use anyhow::{Context, Result};

use crate::{
    basic_elements::args::Args,
    types::{ExtensionValue, PioneerRecord, PioneerType, Variant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintShape {
    /// `mintPioneer(uint8 pioneerType, address player)`
    TypeAndPlayer(&'static str),
    /// `mint(uint8 pioneerType)`, always minted to the caller
    CallerOnly(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    BuildProtocol,
    MakePrediction,
    WeaveData,
    LinkEnsName,
    CreateProposal,
    CastVote,
}

impl ActionKind {
    pub fn signature(&self) -> &'static str {
        match self {
            ActionKind::BuildProtocol => "buildProtocol(string,uint256)",
            ActionKind::MakePrediction => "makePrediction(string,uint256,uint8)",
            ActionKind::WeaveData => "weaveData(string,uint256)",
            ActionKind::LinkEnsName => "linkEnsName(string)",
            ActionKind::CreateProposal => "createProposal(string)",
            ActionKind::CastVote => "castVote(uint256,bool)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uint,
    Text,
}

#[derive(Debug)]
pub struct ContractShape {
    pub has_pioneer: &'static str,
    pub player_pioneer: &'static str,
    pub pioneer_data: &'static str,
    pub total_supply: &'static str,
    pub minting_available: &'static str,
    pub mint: MintShape,
    pub actions: &'static [ActionKind],
    // Fields the variant appends after the common record layout
    pub extensions: &'static [(&'static str, FieldKind)],
}

const PIONEER_MINT: MintShape = MintShape::TypeAndPlayer("mintPioneer(uint8,address)");

const STANDARD: ContractShape = ContractShape {
    has_pioneer: "hasPioneer(address)",
    player_pioneer: "getPlayerPioneer(address)",
    pioneer_data: "getPioneerData(uint256)",
    total_supply: "totalSupply()",
    minting_available: "isMintingAvailable()",
    mint: PIONEER_MINT,
    actions: &[],
    extensions: &[],
};

const SIMPLE: ContractShape = ContractShape {
    has_pioneer: "hasMinted(address)",
    player_pioneer: "tokenOfPlayer(address)",
    pioneer_data: "pioneers(uint256)",
    total_supply: "totalSupply()",
    minting_available: "mintingEnabled()",
    mint: MintShape::CallerOnly("mint(uint8)"),
    actions: &[],
    extensions: &[],
};

const ENS_GUARDIAN: ContractShape = ContractShape {
    actions: &[ActionKind::LinkEnsName],
    extensions: &[("ensName", FieldKind::Text), ("guardianLevel", FieldKind::Uint)],
    ..STANDARD
};

const DATA_WEAVER: ContractShape = ContractShape {
    actions: &[ActionKind::WeaveData],
    extensions: &[
        ("storageEfficiency", FieldKind::Uint),
        ("datasetsWoven", FieldKind::Uint),
    ],
    ..STANDARD
};

const SOCIAL_ARCHITECT: ContractShape = ContractShape {
    actions: &[ActionKind::BuildProtocol],
    extensions: &[
        ("communityScore", FieldKind::Uint),
        ("protocolsBuilt", FieldKind::Uint),
    ],
    ..STANDARD
};

const ORACLE_SEER: ContractShape = ContractShape {
    actions: &[ActionKind::MakePrediction],
    extensions: &[
        ("predictionAccuracy", FieldKind::Uint),
        ("predictionsMade", FieldKind::Uint),
    ],
    ..STANDARD
};

const GOVERNANCE_GUARDIAN: ContractShape = ContractShape {
    actions: &[ActionKind::CreateProposal, ActionKind::CastVote],
    extensions: &[
        ("votingPower", FieldKind::Uint),
        ("proposalsCreated", FieldKind::Uint),
    ],
    ..STANDARD
};

pub fn shape(variant: Variant) -> &'static ContractShape {
    match variant {
        Variant::Standard => &STANDARD,
        Variant::Simple => &SIMPLE,
        Variant::EnsGuardian => &ENS_GUARDIAN,
        Variant::DataWeaver => &DATA_WEAVER,
        Variant::SocialArchitect => &SOCIAL_ARCHITECT,
        Variant::OracleSeer => &ORACLE_SEER,
        Variant::GovernanceGuardian => &GOVERNANCE_GUARDIAN,
    }
}

/// Decodes `getPioneerData` / `pioneers` return data into the common record.
pub fn decode_record(variant: Variant, token_id: U256, args: &mut Args) -> Result<PioneerRecord> {
    match variant {
        Variant::Simple => decode_simple_record(token_id, args),
        _ => decode_full_record(token_id, args, shape(variant).extensions),
    }
}

// (uint8 type, string name, uint256 mintedAt)
fn decode_simple_record(token_id: U256, args: &mut Args) -> Result<PioneerRecord> {
    let pioneer_type = PioneerType::from_u8(args.next_u8().context("pioneerType")?)?;
    let name = args.next_string().context("name")?;
    let minted_at = args.next_u64().context("mintedAt")?;

    Ok(PioneerRecord {
        token_id: Some(token_id),
        pioneer_type,
        name,
        title: String::new(),
        realm: String::new(),
        rarity: 0,
        minted_at,
        is_active: true,
        extensions: BTreeMap::new(),
    })
}

// (uint8 type, string name, string title, string realm, uint8 rarity, uint256 mintedAt, bool isActive, ...extensions)
fn decode_full_record(
    token_id: U256,
    args: &mut Args,
    extension_fields: &[(&'static str, FieldKind)],
) -> Result<PioneerRecord> {
    let pioneer_type = PioneerType::from_u8(args.next_u8().context("pioneerType")?)?;
    let name = args.next_string().context("name")?;
    let title = args.next_string().context("title")?;
    let realm = args.next_string().context("realm")?;
    let rarity = args.next_u8().context("rarity")?;
    let minted_at = args.next_u64().context("mintedAt")?;
    let is_active = args.next_bool().context("isActive")?;

    let mut extensions = BTreeMap::new();
    for (field, kind) in extension_fields {
        let value = match kind {
            FieldKind::Uint => ExtensionValue::Uint(args.next_u256().context(*field)?),
            FieldKind::Text => ExtensionValue::Text(args.next_string().context(*field)?),
        };
        extensions.insert(field.to_string(), value);
    }

    Ok(PioneerRecord {
        token_id: Some(token_id),
        pioneer_type,
        name,
        title,
        realm,
        rarity,
        minted_at,
        is_active,
        extensions,
    })
}

#[cfg(test)]
pub fn encode_record(variant: Variant, record: &PioneerRecord) -> Vec<u8> {
    let mut args = Args::new();
    args.add_u8(record.pioneer_type.to_u8());
    args.add_string(&record.name);

    if variant == Variant::Simple {
        args.add_u64(record.minted_at);
        return args.serialize();
    }

    args.add_string(&record.title)
        .add_string(&record.realm)
        .add_u8(record.rarity)
        .add_u64(record.minted_at)
        .add_bool(record.is_active);

    for (field, kind) in shape(variant).extensions {
        match (kind, record.extensions.get(*field)) {
            (FieldKind::Uint, Some(ExtensionValue::Uint(value))) => args.add_u256(*value),
            (FieldKind::Text, Some(ExtensionValue::Text(value))) => args.add_string(value),
            (FieldKind::Uint, _) => args.add_u256(U256::ZERO),
            (FieldKind::Text, _) => args.add_string(""),
        };
    }

    args.serialize()
}
