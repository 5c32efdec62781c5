//! Consensus-wide constants shared across validation.

/// The maximum allowed weight for a block (network rule).
pub const MAX_BLOCK_WEIGHT: u32 = 4_000_000;
/// The maximum allowed number of signature check operations in a block (network rule).
pub const MAX_BLOCK_SIGOPS_COST: i64 = 80_000;
/// Factor by which witness bytes are discounted when computing block weight.
pub const WITNESS_SCALE_FACTOR: usize = 4;
/// Coinbase transaction outputs can only be spent after this number of new blocks.
pub const COINBASE_MATURITY: i32 = 100;

/// Locktime values at or above this threshold are unix timestamps, below it block heights.
pub const LOCKTIME_THRESHOLD: i64 = 500_000_000;

/// Maximum script size (consensus).
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Maximum size of a single pushed stack element (consensus).
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Maximum number of counted operations per script (consensus).
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Maximum number of public keys per CHECKMULTISIG (consensus).
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;
/// Maximum combined depth of the main and alt stacks (consensus).
pub const MAX_STACK_SIZE: usize = 1_000;

/// If this bit is set in an input sequence, relative lock-time is disabled.
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
/// If this bit is set, the relative lock-time is time-based, otherwise height-based.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
/// Mask extracting the lock-time value from a sequence number.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;
