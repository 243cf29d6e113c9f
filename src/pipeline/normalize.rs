//! Value normalisation: bring every printed amount to plain EUR.
//!
//! `UNKNOWN` is treated as already being in EUR. This is an approximation,
//! not a guarantee: a document that prints thousands without saying so will
//! be under-reported by a factor of 1 000.

use crate::model::Unit;

/// Factor that converts an amount in `unit` to EUR.
pub fn multiplier(unit: Unit) -> f64 {
    match unit {
        Unit::Eur => 1.0,
        Unit::ThousandEur => 1_000.0,
        Unit::MillionEur => 1_000_000.0,
        Unit::Unknown => 1.0,
    }
}

/// Convert `value` to EUR. A missing value stays missing; it is never
/// coerced to zero here.
pub fn normalize(value: Option<f64>, unit: Unit) -> Option<f64> {
    value.map(|v| v * multiplier(unit))
}
