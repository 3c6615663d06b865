//! Decimal ↔ f64 conversions for the NUMERIC columns (coordinates, altitude).
//!
//! Degree-day values are stored as DOUBLE PRECISION and never pass through here.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Convert an f64 to Decimal preserving full precision.
///
/// Returns `Decimal::ZERO` for non-finite inputs; request validation rejects
/// those before they reach this point.
pub(crate) fn f64_to_decimal_full(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_full received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_f64(v).unwrap_or_else(|| Decimal::new(v as i64, 0))
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_coordinate_round_trip() {
        let lat = f64_to_decimal_full(59.913_868);
        assert!((dec_to_f64(lat) - 59.913_868).abs() < 1e-9);
    }

    #[test]
    fn test_f64_to_decimal_full_non_finite() {
        assert_eq!(f64_to_decimal_full(f64::NAN), Decimal::ZERO);
        assert_eq!(f64_to_decimal_full(f64::INFINITY), Decimal::ZERO);
        assert_eq!(f64_to_decimal_full(f64::NEG_INFINITY), Decimal::ZERO);
    }

    #[test]
    fn test_dec_to_f64_altitude() {
        let d = Decimal::from_str("1234.5").unwrap();
        assert_eq!(dec_to_f64(d), 1234.5);
        assert_eq!(dec_to_f64(Decimal::ZERO), 0.0);
    }
}
