// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// GAS & FEE CONSTANTS
// =============================================================================

pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Gas limit used when `eth_estimateGas` fails for a redeem.
pub const DEFAULT_GAS_LIMIT_FALLBACK: u64 = 500_000;
/// 1.2x headroom over the node's estimate.
pub const DEFAULT_GAS_LIMIT_MULTIPLIER_BPS: u64 = 12_000;
pub const BPS_DENOMINATOR: u64 = 10_000;

pub const DEFAULT_START_FEE_GWEI: f64 = 5.0;
pub const DEFAULT_MAX_FEE_GWEI: f64 = 300.0;
pub const DEFAULT_FEE_ESCALATION: f64 = 1.5;

// =============================================================================
// RETRY & BACKOFF
// =============================================================================

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
pub const DEFAULT_BACKOFF_GROWTH: f64 = 1.7;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

// =============================================================================
// WATCHER / PATROL / RECEIPTS
// =============================================================================

pub const DEFAULT_RECONNECT_MIN_SECS: u64 = 1;
pub const DEFAULT_RECONNECT_MAX_SECS: u64 = 30;
pub const DEFAULT_PATROL_INTERVAL_SECS: u64 = 30;
pub const TRIGGER_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_RECEIPT_POLL_MS: u64 = 1_000;
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_RECEIPT_CONFIRM_BLOCKS: u64 = 1;

/// Tip assumed when fee history carries no reward samples.
pub const FALLBACK_PRIORITY_FEE_WEI: u128 = 2_000_000_000;

pub fn gwei_to_wei(gwei: f64) -> u128 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return 0;
    }
    let wei = (gwei * WEI_PER_GWEI as f64).round();
    wei.min(u128::MAX as f64) as u128
}

pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gwei_conversion_handles_fractions_and_garbage() {
        assert_eq!(gwei_to_wei(30.0), 30_000_000_000);
        assert_eq!(gwei_to_wei(0.05), 50_000_000);
        assert_eq!(gwei_to_wei(-1.0), 0);
        assert_eq!(gwei_to_wei(f64::NAN), 0);
        assert!((wei_to_gwei(1_500_000_000) - 1.5).abs() < f64::EPSILON);
    }
}
