//! Version bits deployment definitions and test-network overrides.

use crate::params::{ConfigError, ConsensusParams, Network};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum DeploymentPos {
    TestDummy = 0,
}

pub const MAX_VERSION_BITS_DEPLOYMENTS: usize = 1;

pub const ALL_DEPLOYMENTS: [DeploymentPos; MAX_VERSION_BITS_DEPLOYMENTS] =
    [DeploymentPos::TestDummy];

impl DeploymentPos {
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}

/// A single soft-fork deployment slot in the consensus parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Deployment {
    /// Version field bit used to signal readiness (0-28).
    pub bit: u8,
    /// Earliest median time past at which signal tallying starts.
    pub start_time: i64,
    /// Median time past after which a non-locked-in deployment fails.
    pub timeout: i64,
}

impl Deployment {
    /// Sentinel timeout for deployments that can never fail.
    pub const NO_TIMEOUT: i64 = i64::MAX;
}

#[derive(Clone, Copy, Debug)]
pub struct DeploymentInfo {
    pub name: &'static str,
    /// Whether getblocktemplate clients may ignore this rule.
    pub gbt_force: bool,
}

pub const VERSION_BITS_DEPLOYMENT_INFO: [DeploymentInfo; MAX_VERSION_BITS_DEPLOYMENTS] =
    [DeploymentInfo {
        name: "testdummy",
        gbt_force: true,
    }];

pub fn deployment_from_name(name: &str) -> Option<DeploymentPos> {
    ALL_DEPLOYMENTS
        .iter()
        .copied()
        .find(|pos| VERSION_BITS_DEPLOYMENT_INFO[pos.as_usize()].name == name)
}

/// Replaces a deployment's activation window, for test harnesses.
///
/// Only test chains may have their schedule rewritten; production
/// parameters are immutable once selected.
pub fn override_deployment(
    consensus: &mut ConsensusParams,
    pos: DeploymentPos,
    start_time: i64,
    timeout: i64,
) -> Result<(), ConfigError> {
    if consensus.network == Network::Mainnet {
        return Err(ConfigError::MalformedParameter(
            "deployment overrides are only available on test chains".to_string(),
        ));
    }
    consensus.deployments[pos.as_usize()].start_time = start_time;
    consensus.deployments[pos.as_usize()].timeout = timeout;
    Ok(())
}

/// Test-harness overrides accepted only when constructing regtest parameters.
#[derive(Clone, Debug, Default)]
pub struct RegtestOptions {
    /// Segwit activation height; `-1` disables segwit entirely.
    pub segwit_height: Option<i64>,
    /// Repeatable `name:start:timeout` deployment overrides.
    pub version_bits_params: Vec<String>,
}

pub(crate) fn apply_segwit_height_override(
    consensus: &mut ConsensusParams,
    height: i64,
) -> Result<(), ConfigError> {
    if !(-1..i32::MAX as i64).contains(&height) {
        return Err(ConfigError::MalformedParameter(format!(
            "activation height {height} for segwit is out of valid range, use -1 to disable segwit"
        )));
    }
    let height = if height == -1 {
        baddcoin_log::log_info!("segwit disabled for testing");
        // "Disabled" is an unreachable activation height, not a separate state.
        i32::MAX as i64
    } else {
        height
    };
    consensus.segwit_height = height as i32;
    Ok(())
}

pub(crate) fn apply_version_bits_override(
    consensus: &mut ConsensusParams,
    raw: &str,
) -> Result<(), ConfigError> {
    let fields: Vec<&str> = raw.split(':').collect();
    if fields.len() != 3 {
        return Err(ConfigError::MalformedParameter(
            "version bits parameters malformed, expecting deployment:start:end".to_string(),
        ));
    }
    let start_time: i64 = fields[1].parse().map_err(|_| {
        ConfigError::MalformedParameter(format!("invalid deployment start time ({})", fields[1]))
    })?;
    let timeout: i64 = fields[2].parse().map_err(|_| {
        ConfigError::MalformedParameter(format!("invalid deployment timeout ({})", fields[2]))
    })?;
    let pos = deployment_from_name(fields[0]).ok_or_else(|| {
        ConfigError::MalformedParameter(format!("invalid deployment ({})", fields[0]))
    })?;
    override_deployment(consensus, pos, start_time, timeout)?;
    baddcoin_log::log_info!(
        "setting version bits activation parameters for {} to start={}, timeout={}",
        fields[0],
        start_time,
        timeout
    );
    Ok(())
}
