//! Resource ceilings of script evaluation.
//!
//! Before Genesis every ceiling is a fixed protocol constant. After it each
//! ceiling has a consensus value and a policy value that a node may lower.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ConfigError;

pub const MAX_OPS_PER_SCRIPT_BEFORE_GENESIS: u64 = 500;
pub const MAX_OPS_PER_SCRIPT_AFTER_GENESIS: u64 = u32::MAX as u64;
pub const DEFAULT_OPS_PER_SCRIPT_POLICY_AFTER_GENESIS: u64 = u32::MAX as u64;

pub const MAX_PUBKEYS_PER_MULTISIG_BEFORE_GENESIS: u64 = 20;
pub const MAX_PUBKEYS_PER_MULTISIG_AFTER_GENESIS: u64 = u32::MAX as u64;
pub const DEFAULT_PUBKEYS_PER_MULTISIG_POLICY_AFTER_GENESIS: u64 = u32::MAX as u64;

pub const MAX_SCRIPT_NUM_LENGTH_BEFORE_GENESIS: u64 = 4;
pub const MAX_SCRIPT_NUM_LENGTH_AFTER_GENESIS: u64 = 750 * 1000;
pub const DEFAULT_SCRIPT_NUM_LENGTH_POLICY_AFTER_GENESIS: u64 = 250 * 1000;

pub const MAX_SCRIPT_SIZE_BEFORE_GENESIS: u64 = 10_000;
pub const MAX_SCRIPT_SIZE_AFTER_GENESIS: u64 = u32::MAX as u64;
pub const DEFAULT_MAX_SCRIPT_SIZE_POLICY_AFTER_GENESIS: u64 = 500 * 1000;

pub const MAX_STACK_MEMORY_USAGE_BEFORE_GENESIS: u64 = i64::MAX as u64;
pub const DEFAULT_STACK_MEMORY_USAGE_CONSENSUS_AFTER_GENESIS: u64 = i64::MAX as u64;
pub const DEFAULT_STACK_MEMORY_USAGE_POLICY_AFTER_GENESIS: u64 = 100 * 1000 * 1000;

/// Largest element that may be pushed before Genesis.
pub const MAX_SCRIPT_ELEMENT_SIZE_BEFORE_GENESIS: usize = 520;
/// Largest combined number of main and alt stack elements before Genesis.
pub const MAX_STACK_ELEMENTS_BEFORE_GENESIS: usize = 1000;

/// Policy ceilings, validated on every change.
///
/// Deserialization goes through the setters, so a loaded file obeys the
/// same rules as programmatic configuration. Missing fields keep their
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptConfig {
    max_ops_per_script: u64,
    max_pubkeys_per_multisig: u64,
    max_script_num_length: u64,
    max_script_size: u64,
    max_stack_memory_usage_consensus: u64,
    max_stack_memory_usage_policy: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_ops_per_script: DEFAULT_OPS_PER_SCRIPT_POLICY_AFTER_GENESIS,
            max_pubkeys_per_multisig: DEFAULT_PUBKEYS_PER_MULTISIG_POLICY_AFTER_GENESIS,
            max_script_num_length: DEFAULT_SCRIPT_NUM_LENGTH_POLICY_AFTER_GENESIS,
            max_script_size: DEFAULT_MAX_SCRIPT_SIZE_POLICY_AFTER_GENESIS,
            max_stack_memory_usage_consensus: DEFAULT_STACK_MEMORY_USAGE_CONSENSUS_AFTER_GENESIS,
            max_stack_memory_usage_policy: DEFAULT_STACK_MEMORY_USAGE_POLICY_AFTER_GENESIS,
        }
    }
}

/// Shared rule of the single-value setters: negative is rejected, anything
/// above `max` is rejected and zero selects `max`.
fn checked_policy(setting: &'static str, value: i64, max: u64) -> Result<u64, ConfigError> {
    if value < 0 {
        return Err(ConfigError::Negative { setting, value });
    }
    let v = value as u64;
    if v > max {
        return Err(ConfigError::AboveConsensus { setting, value, max });
    }
    Ok(if v == 0 { max } else { v })
}

impl ScriptConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_ops_per_script_policy(&mut self, value: i64) -> Result<(), ConfigError> {
        self.max_ops_per_script = checked_policy(
            "max ops per script",
            value,
            MAX_OPS_PER_SCRIPT_AFTER_GENESIS,
        )?;
        Ok(())
    }

    pub fn set_max_pubkeys_per_multisig_policy(&mut self, value: i64) -> Result<(), ConfigError> {
        self.max_pubkeys_per_multisig = checked_policy(
            "max pubkeys per multisig",
            value,
            MAX_PUBKEYS_PER_MULTISIG_AFTER_GENESIS,
        )?;
        Ok(())
    }

    /// Also rejects lengths below the pre-Genesis 4 bytes.
    pub fn set_max_script_num_length_policy(&mut self, value: i64) -> Result<(), ConfigError> {
        const SETTING: &str = "max script number length";
        let v = checked_policy(SETTING, value, MAX_SCRIPT_NUM_LENGTH_AFTER_GENESIS)?;
        if v < MAX_SCRIPT_NUM_LENGTH_BEFORE_GENESIS {
            return Err(ConfigError::BelowMinimum {
                setting: SETTING,
                value,
                min: MAX_SCRIPT_NUM_LENGTH_BEFORE_GENESIS,
            });
        }
        self.max_script_num_length = v;
        Ok(())
    }

    pub fn set_max_script_size_policy(&mut self, value: i64) -> Result<(), ConfigError> {
        self.max_script_size = checked_policy(
            "max script size",
            value,
            MAX_SCRIPT_SIZE_AFTER_GENESIS,
        )?;
        Ok(())
    }

    /// Sets both stack memory ceilings. Zero selects the consensus default
    /// for either, and the policy may not exceed the consensus value.
    pub fn set_max_stack_memory_usage(&mut self, consensus: i64, policy: i64) -> Result<(), ConfigError> {
        if consensus < 0 {
            return Err(ConfigError::Negative {
                setting: "max stack memory usage (consensus)",
                value: consensus,
            });
        }
        if policy < 0 {
            return Err(ConfigError::Negative {
                setting: "max stack memory usage (policy)",
                value: policy,
            });
        }
        let consensus = match consensus as u64 {
            0 => DEFAULT_STACK_MEMORY_USAGE_CONSENSUS_AFTER_GENESIS,
            v => v,
        };
        let policy = match policy as u64 {
            0 => DEFAULT_STACK_MEMORY_USAGE_CONSENSUS_AFTER_GENESIS,
            v => v,
        };
        if policy > consensus {
            return Err(ConfigError::PolicyAboveConsensus { policy, consensus });
        }
        self.max_stack_memory_usage_consensus = consensus;
        self.max_stack_memory_usage_policy = policy;
        Ok(())
    }

    pub fn max_ops_per_script(&self, genesis: bool, consensus: bool) -> u64 {
        match (genesis, consensus) {
            (false, _) => MAX_OPS_PER_SCRIPT_BEFORE_GENESIS,
            (true, true) => MAX_OPS_PER_SCRIPT_AFTER_GENESIS,
            (true, false) => self.max_ops_per_script,
        }
    }

    pub fn max_pubkeys_per_multisig(&self, genesis: bool, consensus: bool) -> u64 {
        match (genesis, consensus) {
            (false, _) => MAX_PUBKEYS_PER_MULTISIG_BEFORE_GENESIS,
            (true, true) => MAX_PUBKEYS_PER_MULTISIG_AFTER_GENESIS,
            (true, false) => self.max_pubkeys_per_multisig,
        }
    }

    pub fn max_script_num_length(&self, genesis: bool, consensus: bool) -> u64 {
        match (genesis, consensus) {
            (false, _) => MAX_SCRIPT_NUM_LENGTH_BEFORE_GENESIS,
            (true, true) => MAX_SCRIPT_NUM_LENGTH_AFTER_GENESIS,
            (true, false) => self.max_script_num_length,
        }
    }

    pub fn max_script_size(&self, genesis: bool, consensus: bool) -> u64 {
        match (genesis, consensus) {
            (false, _) => MAX_SCRIPT_SIZE_BEFORE_GENESIS,
            (true, true) => MAX_SCRIPT_SIZE_AFTER_GENESIS,
            (true, false) => self.max_script_size,
        }
    }

    pub fn max_stack_memory_usage(&self, genesis: bool, consensus: bool) -> u64 {
        match (genesis, consensus) {
            (false, _) => MAX_STACK_MEMORY_USAGE_BEFORE_GENESIS,
            (true, true) => self.max_stack_memory_usage_consensus,
            (true, false) => self.max_stack_memory_usage_policy,
        }
    }
}

/// Field layout of a config file. Missing fields keep their defaults.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    max_ops_per_script: Option<i64>,
    max_pubkeys_per_multisig: Option<i64>,
    max_script_num_length: Option<i64>,
    max_script_size: Option<i64>,
    max_stack_memory_usage_consensus: Option<i64>,
    max_stack_memory_usage_policy: Option<i64>,
}

impl TryFrom<RawConfig> for ScriptConfig {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut config = ScriptConfig::default();
        if let Some(v) = raw.max_ops_per_script {
            config.set_max_ops_per_script_policy(v)?;
        }
        if let Some(v) = raw.max_pubkeys_per_multisig {
            config.set_max_pubkeys_per_multisig_policy(v)?;
        }
        if let Some(v) = raw.max_script_num_length {
            config.set_max_script_num_length_policy(v)?;
        }
        if let Some(v) = raw.max_script_size {
            config.set_max_script_size_policy(v)?;
        }
        if raw.max_stack_memory_usage_consensus.is_some() || raw.max_stack_memory_usage_policy.is_some() {
            config.set_max_stack_memory_usage(
                raw.max_stack_memory_usage_consensus
                    .unwrap_or(config.max_stack_memory_usage_consensus as i64),
                raw.max_stack_memory_usage_policy
                    .unwrap_or(config.max_stack_memory_usage_policy as i64),
            )?;
        }
        Ok(config)
    }
}

impl<'de> Deserialize<'de> for ScriptConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawConfig::deserialize(deserializer)?;
        ScriptConfig::try_from(raw).map_err(serde::de::Error::custom)
    }
}
