pub mod variants;

use alloy_primitives::{Address, Bytes, U256};
use serde::Serialize;

use crate::{
    basic_elements::{
        args::Args,
        serializers::{call_data, token_id_or_none},
    },
    client::transport::CallRequest,
    error::PioneerError,
    registry::ChainConfig,
    types::{ChainId, PioneerRecord, PioneerType, Variant},
};

use self::variants::{ActionKind, MintShape, decode_record, shape};

// Confidence is a percentage on the OracleSeer contract
const MAX_PREDICTION_CONFIDENCE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReadCall {
    HasPioneer(Address),
    GetPlayerPioneer(Address),
    GetPioneerData(U256),
    TotalSupply,
    IsMintingAvailable,
}

impl ReadCall {
    pub fn name(&self) -> &'static str {
        match self {
            ReadCall::HasPioneer(_) => "hasPioneer",
            ReadCall::GetPlayerPioneer(_) => "getPlayerPioneer",
            ReadCall::GetPioneerData(_) => "getPioneerData",
            ReadCall::TotalSupply => "totalSupply",
            ReadCall::IsMintingAvailable => "isMintingAvailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PioneerAction {
    BuildProtocol {
        name: String,
        weight: U256,
    },
    MakePrediction {
        market: String,
        predicted_value: U256,
        confidence: u8,
    },
    WeaveData {
        dataset_name: String,
        size_bytes: U256,
    },
    LinkEnsName {
        ens_name: String,
    },
    CreateProposal {
        description: String,
    },
    CastVote {
        proposal_id: U256,
        support: bool,
    },
}

impl PioneerAction {
    pub fn name(&self) -> &'static str {
        match self {
            PioneerAction::BuildProtocol { .. } => "buildProtocol",
            PioneerAction::MakePrediction { .. } => "makePrediction",
            PioneerAction::WeaveData { .. } => "weaveData",
            PioneerAction::LinkEnsName { .. } => "linkEnsName",
            PioneerAction::CreateProposal { .. } => "createProposal",
            PioneerAction::CastVote { .. } => "castVote",
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            PioneerAction::BuildProtocol { .. } => ActionKind::BuildProtocol,
            PioneerAction::MakePrediction { .. } => ActionKind::MakePrediction,
            PioneerAction::WeaveData { .. } => ActionKind::WeaveData,
            PioneerAction::LinkEnsName { .. } => ActionKind::LinkEnsName,
            PioneerAction::CreateProposal { .. } => ActionKind::CreateProposal,
            PioneerAction::CastVote { .. } => ActionKind::CastVote,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, PioneerError> {
        let mut args = Args::new();
        match self {
            PioneerAction::BuildProtocol { name, weight } => {
                non_empty("protocol name", name)?;
                args.add_string(name).add_u256(*weight);
            }
            PioneerAction::MakePrediction {
                market,
                predicted_value,
                confidence,
            } => {
                non_empty("market", market)?;
                if *confidence > MAX_PREDICTION_CONFIDENCE {
                    return Err(PioneerError::Encoding(format!(
                        "confidence {} is above {}",
                        confidence, MAX_PREDICTION_CONFIDENCE
                    )));
                }
                args.add_string(market)
                    .add_u256(*predicted_value)
                    .add_u8(*confidence);
            }
            PioneerAction::WeaveData {
                dataset_name,
                size_bytes,
            } => {
                non_empty("dataset name", dataset_name)?;
                args.add_string(dataset_name).add_u256(*size_bytes);
            }
            PioneerAction::LinkEnsName { ens_name } => {
                non_empty("ENS name", ens_name)?;
                args.add_string(ens_name);
            }
            PioneerAction::CreateProposal { description } => {
                non_empty("proposal description", description)?;
                args.add_string(description);
            }
            PioneerAction::CastVote {
                proposal_id,
                support,
            } => {
                args.add_u256(*proposal_id).add_bool(*support);
            }
        }
        Ok(args.serialize())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), PioneerError> {
    if value.trim().is_empty() {
        return Err(PioneerError::Encoding(format!("{field} must not be empty")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WriteCall {
    MintPioneer {
        pioneer_type: PioneerType,
        player: Address,
    },
    Action(PioneerAction),
}

impl WriteCall {
    pub fn name(&self) -> &'static str {
        match self {
            WriteCall::MintPioneer { .. } => "mintPioneer",
            WriteCall::Action(action) => action.name(),
        }
    }

    // Player whose reads change when this call confirms.
    pub fn player(&self, sender: Address) -> Address {
        match self {
            WriteCall::MintPioneer { player, .. } => *player,
            WriteCall::Action(_) => sender,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadValue {
    Flag(bool),
    Uint(U256),
    TokenId(Option<U256>),
    Record(Option<Box<PioneerRecord>>),
}

impl ReadValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ReadValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            ReadValue::Uint(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_token_id(&self) -> Option<Option<U256>> {
        match self {
            ReadValue::TokenId(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<Option<&PioneerRecord>> {
        match self {
            ReadValue::Record(value) => Some(value.as_deref()),
            _ => None,
        }
    }
}

/// Function selector plus encoded arguments for one contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDescriptor {
    pub chain_id: ChainId,
    pub to: Address,
    pub signature: &'static str,
    pub data: Bytes,
}

impl CallDescriptor {
    pub fn call_request(&self) -> CallRequest {
        CallRequest {
            to: self.to,
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContractAdapter<'a> {
    config: &'a ChainConfig,
}

impl<'a> ContractAdapter<'a> {
    pub fn new(config: &'a ChainConfig) -> Self {
        Self { config }
    }

    pub fn variant(&self) -> Variant {
        self.config.variant
    }

    pub fn supports(&self, action: &PioneerAction) -> bool {
        shape(self.config.variant).actions.contains(&action.kind())
    }

    fn descriptor(&self, signature: &'static str, encoded_args: &[u8]) -> CallDescriptor {
        CallDescriptor {
            chain_id: self.config.chain_id,
            to: self.config.contract_address,
            signature,
            data: call_data(signature, encoded_args),
        }
    }

    pub fn encode_read(&self, call: &ReadCall) -> Result<CallDescriptor, PioneerError> {
        let shape = shape(self.config.variant);
        let mut args = Args::new();

        let signature = match call {
            ReadCall::HasPioneer(player) => {
                args.add_address(*player);
                shape.has_pioneer
            }
            ReadCall::GetPlayerPioneer(player) => {
                args.add_address(*player);
                shape.player_pioneer
            }
            ReadCall::GetPioneerData(token_id) => {
                if token_id.is_zero() {
                    return Err(PioneerError::Encoding("token id 0 is never minted".into()));
                }
                args.add_u256(*token_id);
                shape.pioneer_data
            }
            ReadCall::TotalSupply => shape.total_supply,
            ReadCall::IsMintingAvailable => shape.minting_available,
        };

        Ok(self.descriptor(signature, &args.serialize()))
    }

    pub fn decode_read(&self, call: &ReadCall, data: &[u8]) -> Result<ReadValue, PioneerError> {
        let mut args = Args::from_bytes(data);

        let value = match call {
            ReadCall::HasPioneer(_) | ReadCall::IsMintingAvailable => {
                ReadValue::Flag(args.next_bool().map_err(PioneerError::decoding)?)
            }
            ReadCall::GetPlayerPioneer(_) => ReadValue::TokenId(token_id_or_none(
                args.next_u256().map_err(PioneerError::decoding)?,
            )),
            ReadCall::TotalSupply => {
                ReadValue::Uint(args.next_u256().map_err(PioneerError::decoding)?)
            }
            ReadCall::GetPioneerData(token_id) => {
                let record = decode_record(self.config.variant, *token_id, &mut args)
                    .map_err(PioneerError::decoding)?;
                ReadValue::Record(Some(Box::new(record)))
            }
        };

        Ok(value)
    }

    pub fn encode_write(
        &self,
        call: &WriteCall,
        sender: Address,
    ) -> Result<CallDescriptor, PioneerError> {
        let shape = shape(self.config.variant);

        match call {
            WriteCall::MintPioneer {
                pioneer_type,
                player,
            } => match shape.mint {
                MintShape::TypeAndPlayer(signature) => {
                    let mut args = Args::new();
                    args.add_u8(pioneer_type.to_u8()).add_address(*player);
                    Ok(self.descriptor(signature, &args.serialize()))
                }
                MintShape::CallerOnly(signature) => {
                    if *player != sender {
                        return Err(PioneerError::Encoding(format!(
                            "the {} contract only mints to the caller",
                            self.config.variant
                        )));
                    }
                    let mut args = Args::new();
                    args.add_u8(pioneer_type.to_u8());
                    Ok(self.descriptor(signature, &args.serialize()))
                }
            },
            WriteCall::Action(action) => {
                if !self.supports(action) {
                    return Err(PioneerError::UnsupportedOperation {
                        variant: self.config.variant,
                        operation: action.name(),
                    });
                }
                let encoded = action.encode()?;
                Ok(self.descriptor(action.kind().signature(), &encoded))
            }
        }
    }
}
