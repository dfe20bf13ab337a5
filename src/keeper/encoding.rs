//! Word packing for batched on-chain submissions.
//!
//! Both batch entrypoints take a single 256-bit word enumerating their
//! targets:
//! - rebalance: up to 15 offset-shifted tick ids, 16 bits each, with the
//!   entry count in the lowest 16 bits,
//! - liquidation: up to 8 position ids, 32 bits each, no trailing count
//!   (the contract stops at the first zero word, which is why position
//!   id 0 stays reserved).
//!
//! Entries are appended lowest-bits-first, so index order on this side
//! matches iteration order on the contract side.

use alloy::primitives::U256;

use crate::math::TICK_OFFSET;

/// Capacity of one packed rebalance word.
pub const MAX_REBALANCE_BATCH: usize = 15;

/// Capacity of one packed liquidation word.
pub const MAX_LIQUIDATE_BATCH: usize = 8;

/// Pack signed tick ids into one word: each entry is `tick + 32768` in 16
/// bits, followed by the count in the low 16 bits.
///
/// Callers guarantee at most [`MAX_REBALANCE_BATCH`] in-range ticks; both
/// are planner invariants, so violations panic in debug builds only.
pub fn pack_ticks(ticks: &[i32]) -> U256 {
    debug_assert!(ticks.len() <= MAX_REBALANCE_BATCH);
    let mut word = U256::ZERO;
    for tick in ticks {
        let shifted = tick + TICK_OFFSET;
        debug_assert!((0..=u16::MAX as i32).contains(&shifted));
        word = (word << 16) + U256::from(shifted as u16);
    }
    (word << 16) + U256::from(ticks.len() as u16)
}

/// Pack position ids into one word, 32 bits each.
pub fn pack_positions(positions: &[u32]) -> U256 {
    debug_assert!(positions.len() <= MAX_LIQUIDATE_BATCH);
    let mut word = U256::ZERO;
    for id in positions {
        word = (word << 32) + U256::from(*id);
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_single_tick() {
        // Tick -100 shifts to 32668; count 1 in the low half-word.
        let word = pack_ticks(&[-100]);
        assert_eq!(word, (U256::from(32_668u32) << 16) + U256::from(1u8));
    }

    #[test]
    fn test_pack_ticks_order_and_count() {
        let word = pack_ticks(&[0, 1, -1]);
        let expected = (((U256::from(32_768u32) << 16) + U256::from(32_769u32)) << 16)
            + U256::from(32_767u32);
        assert_eq!(word, (expected << 16) + U256::from(3u8));
    }

    #[test]
    fn test_full_rebalance_word_uses_all_bits() {
        // 15 entries of 16 bits plus the count exactly fill the word; the
        // top half-word is the first tick packed.
        let ticks: Vec<i32> = (0..15).collect();
        let word = pack_ticks(&ticks);
        assert_eq!(word >> 240, U256::from(32_768u32));
        assert_eq!(word & U256::from(0xffffu32), U256::from(15u8));
    }

    #[test]
    fn test_pack_positions() {
        let word = pack_positions(&[7, 1_000_000]);
        assert_eq!(word, (U256::from(7u8) << 32) + U256::from(1_000_000u32));
    }

    #[test]
    fn test_empty_packs_are_zero_words() {
        assert_eq!(pack_ticks(&[]), U256::ZERO);
        assert_eq!(pack_positions(&[]), U256::ZERO);
    }
}
