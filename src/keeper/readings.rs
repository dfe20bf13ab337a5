//! Per-cycle aggregated chain reads.
//!
//! All volatile quantities a cycle needs (oracle prices, provider rates,
//! reserve balances, base-pool liquidity, stable-swap curve parameters)
//! are fetched in one aggregated call so every number is from the same
//! block. The call list is derived from the ledger; decoding re-derives
//! the identical list, so the positional mapping can never drift between
//! the two sides. A count mismatch means the ledger changed between
//! build and decode and fails the cycle.

use std::collections::BTreeMap;

use alloy::primitives::{Address, U256};

use crate::errors::DecodeError;
use crate::keeper::config::Collaborators;
use crate::keeper::ledger::Ledger;
use crate::math::PRECISION;

/// One slot of the aggregated read, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCall {
    /// Pool oracle price, 18 decimals.
    OraclePrice { oracle: Address },
    /// Rate-provider conversion rate for a managed token.
    ProviderRate { provider: Address },
    /// ERC-20 balance of `holder`.
    TokenBalance { token: Address, holder: Address },
    /// Total yield-token liquidity of the base pool.
    BaseYieldTotal { base_pool: Address },
    /// Total stable-token liquidity of the base pool.
    BaseStableTotal { base_pool: Address },
    /// Stable-token valuation price of the base pool, 18 decimals.
    BaseStablePrice { base_pool: Address },
    /// Stable-swap amplification coefficient.
    SwapAmplification { swap: Address },
    /// Stable-swap base fee, 10 decimals.
    SwapBaseFee { swap: Address },
    /// Stable-swap off-peg fee multiplier, 10 decimals.
    SwapOffpegFeeMultiplier { swap: Address },
    /// Stable-swap reserve balance at coin `index`.
    SwapBalance { swap: Address, index: usize },
}

/// Curve parameters of the two-coin stable swap used for quoting the
/// stable-path conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StablePoolSnapshot {
    pub amplification: U256,
    pub base_fee: U256,
    pub offpeg_fee_multiplier: U256,
    /// Coin 0 reserve (the 6-decimal stable).
    pub stable_reserve: U256,
    /// Coin 1 reserve (the 18-decimal debt token).
    pub debt_reserve: U256,
}

/// Decoded snapshot of one cycle's volatile inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReadings {
    /// Oracle price per pool, 18 decimals.
    pub prices: BTreeMap<Address, U256>,
    /// Provider rate per managed token.
    pub rates: BTreeMap<Address, U256>,
    /// Reserve-pool balance per managed token.
    pub reserve_balances: BTreeMap<Address, U256>,
    /// Upper bound on repayable debt this cycle, 18 decimals.
    pub max_liquidity: U256,
    pub swap: StablePoolSnapshot,
}

/// Derive the aggregated call list for the current ledger shape.
///
/// Order: one price per pool (ledger iteration order), then rate and
/// reserve balance per managed token, then three base-pool slots, then
/// five stable-swap slots.
pub fn build_read_calls(ledger: &Ledger, collaborators: &Collaborators) -> Vec<ReadCall> {
    let mut calls = Vec::with_capacity(expected_len(ledger));
    for pool in ledger.pools.values() {
        calls.push(ReadCall::OraclePrice {
            oracle: pool.price_oracle,
        });
    }
    for (token, entry) in &ledger.manager.rate_providers {
        calls.push(ReadCall::ProviderRate {
            provider: entry.provider,
        });
        calls.push(ReadCall::TokenBalance {
            token: *token,
            holder: ledger.manager.reserve_pool,
        });
    }
    let base_pool = collaborators.base_pool;
    calls.push(ReadCall::BaseYieldTotal { base_pool });
    calls.push(ReadCall::BaseStableTotal { base_pool });
    calls.push(ReadCall::BaseStablePrice { base_pool });
    let swap = collaborators.stable_swap;
    calls.push(ReadCall::SwapAmplification { swap });
    calls.push(ReadCall::SwapBaseFee { swap });
    calls.push(ReadCall::SwapOffpegFeeMultiplier { swap });
    calls.push(ReadCall::SwapBalance { swap, index: 0 });
    calls.push(ReadCall::SwapBalance { swap, index: 1 });
    calls
}

fn expected_len(ledger: &Ledger) -> usize {
    ledger.pools.len() + 2 * ledger.manager.rate_providers.len() + 3 + 5
}

/// Decode aggregated results positionally, mirroring [`build_read_calls`].
pub fn decode_readings(ledger: &Ledger, values: &[U256]) -> Result<CycleReadings, DecodeError> {
    let expected = expected_len(ledger);
    if values.len() != expected {
        return Err(DecodeError::CountMismatch {
            expected,
            got: values.len(),
        });
    }
    let mut cursor = values.iter().copied();
    let mut next = || cursor.next().unwrap_or_default();

    let mut readings = CycleReadings::default();
    for pool_addr in ledger.pools.keys() {
        readings.prices.insert(*pool_addr, next());
    }
    for token in ledger.manager.rate_providers.keys() {
        readings.rates.insert(*token, next());
        readings.reserve_balances.insert(*token, next());
    }

    let yield_total = next();
    let stable_total = next();
    let stable_price = next();
    readings.max_liquidity = yield_total + stable_total.saturating_mul(stable_price) / PRECISION;

    readings.swap = StablePoolSnapshot {
        amplification: next(),
        base_fee: next(),
        offpeg_fee_multiplier: next(),
        stable_reserve: next(),
        debt_reserve: next(),
    };
    Ok(readings)
}
