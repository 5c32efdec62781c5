//! Version bits deployment state tracking.
//!
//! State for a period is a pure function of the previous period's state
//! and the signal counts observed within the period, so results are
//! memoized per period boundary. Chain history arrives as a
//! height-indexed slice of samples; header storage and median-time
//! computation belong to the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::deployments::{DeploymentPos, MAX_VERSION_BITS_DEPLOYMENTS};
use crate::params::ConsensusParams;

/// Version field prefix blocks must carry for their bits to be tallied.
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;
/// Mask selecting the version field prefix.
pub const VERSIONBITS_TOP_MASK: i32 = 0xe000_0000u32 as i32;
/// Number of usable signal bits.
pub const VERSIONBITS_NUM_BITS: u32 = 29;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

/// Per-block inputs to the state machine.
#[derive(Clone, Copy, Debug)]
pub struct BlockSample {
    pub height: i32,
    pub version: i32,
    pub median_time_past: i64,
}

/// Memoized per-deployment states keyed by period-boundary height.
///
/// Lookups and inserts are guarded per deployment; a racing recomputation
/// writes the identical value, so duplicated work is the only cost.
pub struct VersionBitsCache {
    caches: [Mutex<HashMap<i32, ThresholdState>>; MAX_VERSION_BITS_DEPLOYMENTS],
}

impl VersionBitsCache {
    pub fn new() -> Self {
        Self {
            caches: std::array::from_fn(|_| Mutex::new(HashMap::new())),
        }
    }

    pub fn clear(&self) {
        for cache in &self.caches {
            cache.lock().expect("versionbits cache poisoned").clear();
        }
    }
}

impl Default for VersionBitsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a block's version signals readiness for the given bit.
fn signals(sample: &BlockSample, bit: u8) -> bool {
    (sample.version & VERSIONBITS_TOP_MASK) == VERSIONBITS_TOP_BITS
        && (sample.version >> bit) & 1 != 0
}

pub fn version_bits_mask(params: &ConsensusParams, pos: DeploymentPos) -> u32 {
    1u32 << params.deployments[pos.as_usize()].bit
}

pub fn block_signals(
    sample: &BlockSample,
    params: &ConsensusParams,
    pos: DeploymentPos,
) -> bool {
    signals(sample, params.deployments[pos.as_usize()].bit)
}

/// State applying to the block that would extend `chain`.
///
/// `chain` must be the full ancestry from genesis, indexed by height.
pub fn version_bits_state(
    chain: &[BlockSample],
    params: &ConsensusParams,
    pos: DeploymentPos,
    cache: &VersionBitsCache,
) -> ThresholdState {
    let deployment = &params.deployments[pos.as_usize()];
    let period = params.miner_confirmation_window as i32;
    let threshold = params.rule_change_activation_threshold;
    let start_time = deployment.start_time;
    let timeout = deployment.timeout;

    debug_assert!(chain
        .iter()
        .enumerate()
        .all(|(i, sample)| sample.height == i as i32));

    let mut guard = cache.caches[pos.as_usize()]
        .lock()
        .expect("versionbits cache poisoned");

    // Walk back to the last block of the period preceding the one the
    // next block falls into, then keep stepping whole periods until a
    // cached or trivially-known state is found.
    let tip = chain.len() as i32 - 1;
    let mut boundary = if tip < 0 {
        -1
    } else {
        tip - ((tip + 1) % period)
    };

    let mut to_compute: Vec<i32> = Vec::new();
    let mut state = loop {
        if let Some(state) = guard.get(&boundary) {
            break *state;
        }
        if boundary < 0 {
            // The genesis block is by definition in the Defined state.
            guard.insert(boundary, ThresholdState::Defined);
            break ThresholdState::Defined;
        }
        if chain[boundary as usize].median_time_past < start_time {
            guard.insert(boundary, ThresholdState::Defined);
            break ThresholdState::Defined;
        }
        to_compute.push(boundary);
        boundary -= period;
    };

    // Replay forward, one period per step.
    while let Some(boundary) = to_compute.pop() {
        let median_time_past = chain[boundary as usize].median_time_past;
        state = match state {
            ThresholdState::Defined => {
                if median_time_past >= timeout {
                    ThresholdState::Failed
                } else if median_time_past >= start_time {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                // The timeout wins over the tally within the same period.
                if median_time_past >= timeout {
                    ThresholdState::Failed
                } else {
                    let first = boundary - period + 1;
                    let count = chain[first as usize..=boundary as usize]
                        .iter()
                        .filter(|sample| signals(sample, deployment.bit))
                        .count() as u32;
                    if count >= threshold {
                        ThresholdState::LockedIn
                    } else {
                        ThresholdState::Started
                    }
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            terminal @ (ThresholdState::Active | ThresholdState::Failed) => terminal,
        };
        guard.insert(boundary, state);
    }

    state
}

/// First height at which the current state applied.
pub fn version_bits_state_since_height(
    chain: &[BlockSample],
    params: &ConsensusParams,
    pos: DeploymentPos,
    cache: &VersionBitsCache,
) -> i32 {
    let initial = version_bits_state(chain, params, pos, cache);
    if initial == ThresholdState::Defined {
        return 0;
    }

    let period = params.miner_confirmation_window as i32;
    let tip = chain.len() as i32 - 1;
    if tip < 0 {
        return 0;
    }

    // Step back period by period while the state stays the same.
    let mut boundary = tip - ((tip + 1) % period);
    loop {
        let previous = boundary - period;
        if previous < -1 {
            break;
        }
        let state = version_bits_state(&chain[..(previous + 1) as usize], params, pos, cache);
        if state != initial {
            break;
        }
        boundary = previous;
        if boundary < 0 {
            break;
        }
    }
    boundary + 1
}

/// Signal tally for the period in progress at the tip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitsTally {
    pub period: u32,
    pub threshold: u32,
    pub elapsed: u32,
    pub count: u32,
    /// Whether enough blocks remain in the period to still reach threshold.
    pub possible: bool,
}

pub fn version_bits_statistics(
    chain: &[BlockSample],
    params: &ConsensusParams,
    pos: DeploymentPos,
) -> BitsTally {
    let deployment = &params.deployments[pos.as_usize()];
    let period = params.miner_confirmation_window;
    let threshold = params.rule_change_activation_threshold;

    let tip = chain.len() as i32 - 1;
    if tip < 0 {
        return BitsTally {
            period,
            threshold,
            elapsed: 0,
            count: 0,
            possible: true,
        };
    }

    let start = tip + 1 - (tip + 1) % period as i32;
    let elapsed = (tip + 1 - start) as u32;
    let count = chain[start as usize..=tip as usize]
        .iter()
        .filter(|sample| signals(sample, deployment.bit))
        .count() as u32;
    let possible = period - threshold >= elapsed - count;

    BitsTally {
        period,
        threshold,
        elapsed,
        count,
        possible,
    }
}
