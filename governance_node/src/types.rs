//! Shared types for the governance engine

use crate::error::{GovernanceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account address, `0x`-prefixed 40-hex-digit string, stored lowercased
pub type Address = String;

/// Validate and normalize an address to its canonical lowercase form
pub fn normalize_address(raw: &str) -> Result<Address> {
    let hex_part = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| GovernanceError::InvalidAddress(raw.to_string()))?;

    if hex_part.len() != 40 {
        return Err(GovernanceError::InvalidAddress(raw.to_string()));
    }

    let bytes = hex::decode(hex_part).map_err(|_| GovernanceError::InvalidAddress(raw.to_string()))?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Supported AI model families, one DAO per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Claude,
    Gpt,
    Gemini,
    Grok,
    Llama,
    Mistral,
    DeepSeek,
    Qwen,
    Minimax,
    Kimi,
    Command,
    Phi,
    Falcon,
    Yi,
    Jamba,
    Nemotron,
}

impl ModelType {
    /// All supported model families
    pub const ALL: [ModelType; 16] = [
        ModelType::Claude,
        ModelType::Gpt,
        ModelType::Gemini,
        ModelType::Grok,
        ModelType::Llama,
        ModelType::Mistral,
        ModelType::DeepSeek,
        ModelType::Qwen,
        ModelType::Minimax,
        ModelType::Kimi,
        ModelType::Command,
        ModelType::Phi,
        ModelType::Falcon,
        ModelType::Yi,
        ModelType::Jamba,
        ModelType::Nemotron,
    ];

    /// Canonical lowercase name (`claude`, `gpt`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::Claude => "claude",
            ModelType::Gpt => "gpt",
            ModelType::Gemini => "gemini",
            ModelType::Grok => "grok",
            ModelType::Llama => "llama",
            ModelType::Mistral => "mistral",
            ModelType::DeepSeek => "deepseek",
            ModelType::Qwen => "qwen",
            ModelType::Minimax => "minimax",
            ModelType::Kimi => "kimi",
            ModelType::Command => "command",
            ModelType::Phi => "phi",
            ModelType::Falcon => "falcon",
            ModelType::Yi => "yi",
            ModelType::Jamba => "jamba",
            ModelType::Nemotron => "nemotron",
        }
    }

    /// Governance token symbol, `COR` + uppercased model name (e.g. `CORCLAUDE`)
    pub fn token_symbol(&self) -> String {
        format!("COR{}", self.name().to_uppercase())
    }

    /// Human-readable governance token name
    pub fn token_name(&self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        format!("{} Governance Token", capitalized)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelType {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        ModelType::ALL
            .iter()
            .find(|m| m.name() == lower)
            .copied()
            .ok_or(GovernanceError::UnknownModel(s.to_string()))
    }
}

/// Vote direction, wire-encoded as 0=Against, 1=For, 2=Abstain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    Against,
    For,
    Abstain,
}

impl Support {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Support::Against),
            1 => Some(Support::For),
            2 => Some(Support::Abstain),
            _ => None,
        }
    }
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Support::Against => "against",
            Support::For => "for",
            Support::Abstain => "abstain",
        };
        write!(f, "{}", s)
    }
}
