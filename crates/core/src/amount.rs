//! SOL / lamport conversion

use crate::{CoreError, Result};

/// Lamports in one SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert a whole-currency SOL amount to lamports.
///
/// Rounds to the nearest lamport so that decimal inputs like `0.3` do not
/// lose a lamport to binary floating point representation.
pub fn sol_to_lamports(sol: f64) -> Result<u64> {
    if !sol.is_finite() {
        return Err(CoreError::InvalidAmount(format!("{} is not finite", sol)));
    }
    if sol < 0.0 {
        return Err(CoreError::InvalidAmount(format!("{} is negative", sol)));
    }

    let lamports = (sol * LAMPORTS_PER_SOL as f64).round();
    if lamports >= u64::MAX as f64 {
        return Err(CoreError::InvalidAmount(format!("{} SOL overflows lamports", sol)));
    }
    Ok(lamports as u64)
}

/// Convert lamports to SOL for display
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
