//! Consensus parameter definitions.

use baddcoin_primitives::Hash256;

use crate::deployments::{
    apply_segwit_height_override, apply_version_bits_override, Deployment, RegtestOptions,
    MAX_VERSION_BITS_DEPLOYMENTS,
};
use crate::genesis;
use crate::money::Amount;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "main" => Some(Self::Mainnet),
            "test" => Some(Self::Testnet),
            "regtest" => Some(Self::Regtest),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "main",
            Self::Testnet => "test",
            Self::Regtest => "regtest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownNetwork(String),
    MalformedParameter(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownNetwork(id) => write!(f, "unknown chain '{id}'"),
            ConfigError::MalformedParameter(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Inputs from which the genesis block is reconstructed at startup.
#[derive(Clone, Copy, Debug)]
pub struct GenesisParams {
    pub time: u32,
    pub nonce: u32,
    pub bits: u32,
    pub version: i32,
    pub reward: Amount,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub subsidy_halving_interval: i32,
    /// Block hash excepted from BIP16 enforcement (unused on this chain).
    pub bip16_exception: Hash256,
    pub bip34_height: i32,
    pub bip34_hash: Hash256,
    pub bip65_height: i32,
    pub bip66_height: i32,
    pub csv_height: i32,
    pub segwit_height: i32,
    /// Lowest height from which unknown activated version bits warrant a warning.
    pub min_bip9_warning_height: i32,
    pub pow_limit: Hash256,
    pub pow_target_timespan: i64,
    pub pow_target_spacing: i64,
    pub pow_allow_min_difficulty_blocks: bool,
    pub pow_no_retargeting: bool,
    /// Signalling blocks required within a confirmation window to lock a deployment in.
    pub rule_change_activation_threshold: u32,
    /// Number of blocks per signal-tallying window.
    pub miner_confirmation_window: u32,
    pub deployments: [Deployment; MAX_VERSION_BITS_DEPLOYMENTS],
    pub minimum_chain_work: Hash256,
    /// Signatures in ancestors of this block are assumed valid.
    pub assume_valid: Hash256,
    pub genesis: GenesisParams,
    pub hash_genesis_block: Hash256,
    pub genesis_merkle_root: Hash256,
}

impl ConsensusParams {
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        self.pow_target_timespan / self.pow_target_spacing
    }
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

/// Parses a display-order (big-endian) hex string into an internal-order hash.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }

    if hex.is_empty() {
        return Err(HexError::InvalidLength);
    }

    let mut hex_owned = if hex.len() % 2 == 1 {
        let mut padded = String::with_capacity(hex.len() + 1);
        padded.push('0');
        padded.push_str(hex);
        padded
    } else {
        hex.to_string()
    };

    if hex_owned.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    if hex_owned.len() < 64 {
        let mut padded = String::with_capacity(64);
        for _ in 0..(64 - hex_owned.len()) {
            padded.push('0');
        }
        padded.push_str(&hex_owned);
        hex_owned = padded;
    }

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte =
            u8::from_str_radix(&hex_owned[start..start + 2], 16).map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: i32,
    pub hash: Hash256,
}

/// Statistics about the chain tip at release time, used for progress estimation.
#[derive(Clone, Copy, Debug)]
pub struct ChainTxData {
    pub time: i64,
    pub tx_count: u64,
    pub tx_rate: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct Base58Prefixes {
    pub pubkey_address: u8,
    pub script_address: u8,
    pub secret_key: u8,
    pub ext_public_key: [u8; 4],
    pub ext_secret_key: [u8; 4],
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
    pub message_start: [u8; 4],
    pub default_port: u16,
    pub prune_after_height: u64,
    pub base58_prefixes: Base58Prefixes,
    pub bech32_hrp: &'static str,
    pub checkpoints: Vec<Checkpoint>,
    pub chain_tx_data: ChainTxData,
    pub require_standard: bool,
    pub default_consistency_checks: bool,
    pub is_test_chain: bool,
    pub is_mockable_chain: bool,
}

/// Selects parameters by the network identifier strings accepted on the
/// command line. Fails on unrecognized identifiers; the caller treats that
/// as a fatal configuration error.
pub fn select_chain_params(id: &str) -> Result<ChainParams, ConfigError> {
    match Network::parse(id) {
        Some(network) => Ok(chain_params(network)),
        None => Err(ConfigError::UnknownNetwork(id.to_string())),
    }
}

pub fn chain_params(network: Network) -> ChainParams {
    match network {
        Network::Mainnet => mainnet_chain_params(),
        Network::Testnet => testnet_chain_params(),
        Network::Regtest => regtest_chain_params(),
    }
}

/// Regtest parameters with test-harness activation overrides applied.
///
/// Malformed overrides are rejected before the parameter set is handed out;
/// the process must not start with an inconsistent consensus configuration.
pub fn regtest_chain_params_with(options: &RegtestOptions) -> Result<ChainParams, ConfigError> {
    let mut consensus = regtest_consensus_params();
    if let Some(height) = options.segwit_height {
        apply_segwit_height_override(&mut consensus, height)?;
    }
    for raw in &options.version_bits_params {
        apply_version_bits_override(&mut consensus, raw)?;
    }
    genesis::check_genesis(&consensus);
    Ok(regtest_chain_params_from(consensus))
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        subsidy_halving_interval: 8_400_000,
        bip16_exception: [0u8; 32],
        bip34_height: 0,
        bip34_hash: hash256_from_hex(
            "0000033955ca93157f081fdc9af984377acca48c226bffa8af42e7bd5bc6410d",
        )
        .expect("mainnet bip34 hash"),
        bip65_height: 0,
        bip66_height: 0,
        csv_height: 0,
        segwit_height: 0,
        min_bip9_warning_height: 0,
        pow_limit: hash256_from_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("mainnet pow limit"),
        pow_target_timespan: 10 * 30,
        pow_target_spacing: 30,
        pow_allow_min_difficulty_blocks: false,
        pow_no_retargeting: false,
        rule_change_activation_threshold: 30,
        miner_confirmation_window: 40,
        deployments: [Deployment {
            bit: 28,
            start_time: 0,
            timeout: Deployment::NO_TIMEOUT,
        }],
        minimum_chain_work: hash256_from_hex(
            "000000000000000000000000000000000000000000000000000002711815d737",
        )
        .expect("mainnet minimum chain work"),
        assume_valid: hash256_from_hex(
            "0000033955ca93157f081fdc9af984377acca48c226bffa8af42e7bd5bc6410d",
        )
        .expect("mainnet assume valid"),
        genesis: GenesisParams {
            time: 1_600_081_409,
            nonce: 128_731_164,
            bits: 0x1e0f_fff0,
            version: 1,
            reward: 50 * crate::money::COIN,
        },
        hash_genesis_block: hash256_from_hex(
            "2e883b1393a501f22e9c9cefb13ec2ff4cadb1c627372814e81770fa39a92218",
        )
        .expect("mainnet genesis hash"),
        genesis_merkle_root: hash256_from_hex(
            "9c539954f1bef19189a04314d8c29632e2870940e13d148f4d9ba421428ef784",
        )
        .expect("genesis merkle root"),
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        subsidy_halving_interval: 8_400_000,
        bip16_exception: [0u8; 32],
        bip34_height: 0,
        bip34_hash: hash256_from_hex(
            "0400d26a9a7c311c61f45699a07586883b05f160eb7e72769e72934b16a2c932",
        )
        .expect("testnet bip34 hash"),
        bip65_height: 0,
        bip66_height: 0,
        csv_height: 0,
        segwit_height: 0,
        min_bip9_warning_height: 0,
        pow_limit: hash256_from_hex(
            "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("testnet pow limit"),
        pow_target_timespan: 10 * 30,
        pow_target_spacing: 30,
        pow_allow_min_difficulty_blocks: true,
        pow_no_retargeting: false,
        rule_change_activation_threshold: 30,
        miner_confirmation_window: 40,
        deployments: [Deployment {
            bit: 28,
            start_time: 1_199_145_601, // January 1, 2008
            timeout: 1_230_767_999,    // December 31, 2008
        }],
        minimum_chain_work: [0u8; 32],
        assume_valid: hash256_from_hex(
            "0400d26a9a7c311c61f45699a07586883b05f160eb7e72769e72934b16a2c932",
        )
        .expect("testnet assume valid"),
        genesis: GenesisParams {
            time: 1_600_087_136,
            nonce: 2_085_854_001,
            bits: 0x1e0f_fff0,
            version: 1,
            reward: 50 * crate::money::COIN,
        },
        hash_genesis_block: hash256_from_hex(
            "0400d26a9a7c311c61f45699a07586883b05f160eb7e72769e72934b16a2c932",
        )
        .expect("testnet genesis hash"),
        genesis_merkle_root: hash256_from_hex(
            "9c539954f1bef19189a04314d8c29632e2870940e13d148f4d9ba421428ef784",
        )
        .expect("genesis merkle root"),
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        subsidy_halving_interval: 150,
        bip16_exception: [0u8; 32],
        bip34_height: 0,
        bip34_hash: [0u8; 32],
        bip65_height: 0,
        bip66_height: 0,
        csv_height: 0,
        segwit_height: 0,
        min_bip9_warning_height: 0,
        pow_limit: hash256_from_hex(
            "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("regtest pow limit"),
        pow_target_timespan: 3 * 60 * 60,
        pow_target_spacing: 2 * 60,
        pow_allow_min_difficulty_blocks: true,
        pow_no_retargeting: true,
        rule_change_activation_threshold: 30,
        miner_confirmation_window: 40,
        deployments: [Deployment {
            bit: 28,
            start_time: 0,
            timeout: Deployment::NO_TIMEOUT,
        }],
        minimum_chain_work: [0u8; 32],
        assume_valid: [0u8; 32],
        genesis: GenesisParams {
            time: 1_600_087_394,
            nonce: 2_085_764_951,
            bits: 0x207f_ffff,
            version: 1,
            reward: 50 * crate::money::COIN,
        },
        hash_genesis_block: hash256_from_hex(
            "1ac598aaaa5b8528a6a8d2132be879e84f7161d6b5c2118fdff1f1616f004605",
        )
        .expect("regtest genesis hash"),
        genesis_merkle_root: hash256_from_hex(
            "9c539954f1bef19189a04314d8c29632e2870940e13d148f4d9ba421428ef784",
        )
        .expect("genesis merkle root"),
    }
}

fn parse_checkpoints(entries: &[(i32, &str)]) -> Vec<Checkpoint> {
    entries
        .iter()
        .map(|(height, hash)| Checkpoint {
            height: *height,
            hash: hash256_from_hex(hash).expect("checkpoint hash"),
        })
        .collect()
}

fn mainnet_checkpoints() -> Vec<Checkpoint> {
    parse_checkpoints(&[
        (
            0,
            "2e883b1393a501f22e9c9cefb13ec2ff4cadb1c627372814e81770fa39a92218",
        ),
        (
            1,
            "00000d693a935464bd31f9fd993474ab0cb467aefea4a5317797ceb958563fb0",
        ),
        (
            51,
            "00000395a7bcd3f95b1ae06ab3eb3481c3c58cd46b2676fcd2e2db1480db910a",
        ),
        (
            201,
            "000000666383ac328619af83777aad0e61e926a428a9049b506ac56ff36accef",
        ),
        (
            2000,
            "00000096016d41ae3e17cc312fb412f92fe2a1ccfc1dbdc113ee32a0a388be33",
        ),
        (
            5000,
            "0000002ed1e7d63c481dbcecd2ceed5e61a9d2d9b92ac13dca1709e02faf7f84",
        ),
        (
            80559,
            "0000033955ca93157f081fdc9af984377acca48c226bffa8af42e7bd5bc6410d",
        ),
    ])
}

fn testnet_checkpoints() -> Vec<Checkpoint> {
    parse_checkpoints(&[(
        0,
        "0400d26a9a7c311c61f45699a07586883b05f160eb7e72769e72934b16a2c932",
    )])
}

fn regtest_checkpoints() -> Vec<Checkpoint> {
    parse_checkpoints(&[(
        0,
        "1ac598aaaa5b8528a6a8d2132be879e84f7161d6b5c2118fdff1f1616f004605",
    )])
}

fn mainnet_chain_params() -> ChainParams {
    let consensus = mainnet_consensus_params();
    genesis::check_genesis(&consensus);
    ChainParams {
        network: Network::Mainnet,
        consensus,
        message_start: [0xcd, 0xdc, 0xeb, 0xfa],
        default_port: 28_333,
        prune_after_height: 100_000,
        base58_prefixes: Base58Prefixes {
            pubkey_address: 25,
            script_address: 23,
            secret_key: 128,
            ext_public_key: [0xb2, 0x88, 0xb2, 0x1e],
            ext_secret_key: [0xb2, 0x88, 0xad, 0xe4],
        },
        bech32_hrp: "badd",
        checkpoints: mainnet_checkpoints(),
        chain_tx_data: ChainTxData {
            // getchaintxstats at block 80559.
            time: 1_627_218_010,
            tx_count: 80_593,
            tx_rate: 0.002990978039538613,
        },
        require_standard: true,
        default_consistency_checks: false,
        is_test_chain: false,
        is_mockable_chain: false,
    }
}

fn testnet_chain_params() -> ChainParams {
    let consensus = testnet_consensus_params();
    genesis::check_genesis(&consensus);
    ChainParams {
        network: Network::Testnet,
        consensus,
        message_start: [0xdf, 0xc3, 0xd3, 0xe5],
        default_port: 38_333,
        prune_after_height: 1_000,
        base58_prefixes: Base58Prefixes {
            pubkey_address: 85,
            script_address: 65,
            secret_key: 239,
            ext_public_key: [0xc3, 0x35, 0x87, 0xcf],
            ext_secret_key: [0xc3, 0x35, 0x83, 0x94],
        },
        bech32_hrp: "tbadd",
        checkpoints: testnet_checkpoints(),
        chain_tx_data: ChainTxData {
            time: 1_600_087_136,
            tx_count: 0,
            tx_rate: 0.0,
        },
        require_standard: false,
        default_consistency_checks: false,
        is_test_chain: true,
        is_mockable_chain: false,
    }
}

fn regtest_chain_params() -> ChainParams {
    let consensus = regtest_consensus_params();
    genesis::check_genesis(&consensus);
    regtest_chain_params_from(consensus)
}

fn regtest_chain_params_from(consensus: ConsensusParams) -> ChainParams {
    ChainParams {
        network: Network::Regtest,
        consensus,
        message_start: [0xf3, 0xc2, 0xd1, 0xfb],
        default_port: 48_444,
        prune_after_height: 1_000,
        base58_prefixes: Base58Prefixes {
            pubkey_address: 85,
            script_address: 65,
            secret_key: 239,
            ext_public_key: [0xc3, 0x35, 0x87, 0xcf],
            ext_secret_key: [0xc3, 0x35, 0x83, 0x94],
        },
        bech32_hrp: "rbadd",
        checkpoints: regtest_checkpoints(),
        chain_tx_data: ChainTxData {
            time: 0,
            tx_count: 0,
            tx_rate: 0.0,
        },
        require_standard: true,
        default_consistency_checks: true,
        is_test_chain: true,
        is_mockable_chain: true,
    }
}
