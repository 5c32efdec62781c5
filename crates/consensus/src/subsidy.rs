//! Block subsidy schedule.

use crate::money::{Amount, COIN};
use crate::params::ConsensusParams;

pub fn block_subsidy(height: i32, params: &ConsensusParams) -> Amount {
    let halvings = height / params.subsidy_halving_interval;
    // The shift below is undefined at 64 halvings; the subsidy is zero by then.
    if halvings >= 64 {
        return 0;
    }
    (50 * COIN) >> halvings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{chain_params, Network};

    #[test]
    fn mainnet_halving_schedule() {
        let params = chain_params(Network::Mainnet).consensus;
        assert_eq!(block_subsidy(0, &params), 50 * COIN);
        assert_eq!(block_subsidy(8_399_999, &params), 50 * COIN);
        assert_eq!(block_subsidy(8_400_000, &params), 25 * COIN);
        assert_eq!(block_subsidy(16_800_000, &params), 25 * COIN / 2);
    }

    #[test]
    fn regtest_halving_schedule() {
        let params = chain_params(Network::Regtest).consensus;
        assert_eq!(block_subsidy(0, &params), 50 * COIN);
        assert_eq!(block_subsidy(150, &params), 25 * COIN);
        assert_eq!(block_subsidy(300, &params), 25 * COIN / 2);
        // Far enough out the subsidy vanishes entirely.
        assert_eq!(block_subsidy(150 * 64, &params), 0);
    }
}
