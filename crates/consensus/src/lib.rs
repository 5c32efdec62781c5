//! Consensus parameters, deployment tracking, and chain constants.

pub mod constants;
pub mod deployments;
pub mod genesis;
pub mod money;
pub mod params;
pub mod subsidy;
pub mod versionbits;

pub use deployments::{
    deployment_from_name, override_deployment, Deployment, DeploymentPos, RegtestOptions,
    ALL_DEPLOYMENTS, MAX_VERSION_BITS_DEPLOYMENTS,
};
pub use genesis::genesis_block;
pub use money::{money_range, Amount, COIN, MAX_MONEY};
pub use params::{
    chain_params, hash256_from_hex, regtest_chain_params_with, select_chain_params, ChainParams,
    Checkpoint, ConfigError, ConsensusParams, Network,
};
pub use subsidy::block_subsidy;
pub use versionbits::{
    version_bits_mask, version_bits_state, version_bits_state_since_height,
    version_bits_statistics, BlockSample, ThresholdState, VersionBitsCache,
};
