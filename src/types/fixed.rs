//! Fixed-point arithmetic helpers.
//!
//! All quantities and prices in the engine are raw `u128` integers. An asset
//! with scale `s` stores a quantity `q` as `q * 10^s` raw units; a price for
//! `BASE/QUOTE` is raw quote units per one whole base unit. No floating point
//! is used anywhere in a balance or matching path.

/// Number of decimal digits an asset carries (e.g. 2 for USD, 8 for crypto).
pub type Scale = u32;

/// Returns `10^scale` as a `u128`.
pub fn pow10(scale: Scale) -> u128 {
    10u128.pow(scale)
}

/// Computes the quote-asset notional of `quantity` base-raw units traded at
/// `price`, i.e. `price * quantity / 10^base_scale` with floor division.
///
/// Returns `None` on multiplication overflow. Floor rounding only ever
/// strands residue inside the payer's own locked balance, which is released
/// when the order terminates, so per-asset conservation is exact.
pub fn checked_notional(price: u128, quantity: u128, base_scale: Scale) -> Option<u128> {
    price.checked_mul(quantity).map(|n| n / pow10(base_scale))
}
