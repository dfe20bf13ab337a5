//! Fixed-point accounting primitives shared by every keeper component.
//!
//! Conventions, matching the on-chain accounting:
//! - Share indices are scaled by `BASE = 2^96`. A raw collateral amount is
//!   `coll_shares * BASE / coll_index`; a raw debt amount is
//!   `debt_shares * debt_index / BASE`.
//! - Prices and debt-ratio thresholds are 18-decimal fixed point
//!   (`PRECISION = 10^18`).
//! - Fee and bonus ratios are 9-decimal fixed point (`FEE_PRECISION = 10^9`).
//!
//! Ratio comparisons are done by cross-multiplication so no intermediate
//! division (and therefore no rounding) ever enters an eligibility test.

use alloy::primitives::U256;

/// Share index base unit, `2^96`.
pub const BASE: U256 = U256::from_limbs([0, 1u64 << 32, 0, 0]);

/// 18-decimal fixed-point unit for prices and debt-ratio thresholds.
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 9-decimal fixed-point unit for fee and bonus ratios.
pub const FEE_PRECISION: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

/// Signed tick ids span `[-TICK_OFFSET, TICK_OFFSET)`; adding the offset
/// maps them onto `0..TICK_COUNT` for array addressing.
pub const TICK_OFFSET: i32 = 32768;

/// Number of addressable tick buckets per pool.
pub const TICK_COUNT: usize = 65536;

/// `a * b / denominator` with overflow and zero-divisor checks.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    a.checked_mul(b).map(|p| p / denominator)
}

/// Pro-rata rescale used when re-homing positions after a tick movement:
/// `share * after / before`.
///
/// A zero `before` aggregate implies (by share conservation) that every
/// position share on that tick is also zero, so the result is zero.
pub fn pro_rata(share: U256, after: U256, before: U256) -> U256 {
    if before.is_zero() || share.is_zero() {
        return U256::ZERO;
    }
    share.saturating_mul(after) / before
}

/// Cross-multiplied test for `rawDebts / (rawColls * price / P) >= threshold / P`,
/// i.e. `rawDebts * P^2 >= threshold * rawColls * price`.
///
/// Returns `None` if either product overflows 256 bits; callers treat an
/// overflowing candidate as ineligible rather than aborting the scan.
pub fn ratio_at_least(
    raw_debts: U256,
    raw_colls: U256,
    price: U256,
    threshold: U256,
) -> Option<bool> {
    let lhs = raw_debts.checked_mul(PRECISION)?.checked_mul(PRECISION)?;
    let rhs = threshold.checked_mul(raw_colls)?.checked_mul(price)?;
    Some(lhs >= rhs)
}

/// Raw debt amount that must be repaid to bring an entity back to exactly
/// `debt_ratio`, accounting for the collateral bonus paid to the executor:
///
/// ```text
/// x = (rawDebts·P² − debtRatio·price·rawColls) / (P² − P·debtRatio·(FEE_P + bonusRatio)/FEE_P)
/// ```
///
/// Returns `None` for degenerate inputs: an entity already at or below the
/// target ratio, a non-positive denominator (threshold × bonus too large),
/// or any intermediate overflow. Such candidates are dropped, never planned.
pub fn required_repay(
    raw_debts: U256,
    raw_colls: U256,
    price: U256,
    debt_ratio: U256,
    bonus_ratio: U256,
) -> Option<U256> {
    let numerator = raw_debts
        .checked_mul(PRECISION)?
        .checked_mul(PRECISION)?
        .checked_sub(debt_ratio.checked_mul(price)?.checked_mul(raw_colls)?)?;
    let incentive = PRECISION
        .checked_mul(debt_ratio)?
        .checked_mul(FEE_PRECISION.checked_add(bonus_ratio)?)?
        / FEE_PRECISION;
    let denominator = PRECISION.checked_mul(PRECISION)?.checked_sub(incentive)?;
    if denominator.is_zero() {
        return None;
    }
    let repay = numerator / denominator;
    if repay.is_zero() {
        return None;
    }
    Some(repay)
}
