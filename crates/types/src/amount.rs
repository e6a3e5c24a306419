use thiserror::Error;

/// Number of tinybars in one HBAR.
pub const TINYBARS_PER_HBAR: i128 = 100_000_000;

/// Monetary amount in tinybars (1 HBAR = 1e8 tinybars).
///
/// All engine-internal accounting is integer tinybars so that conservation
/// checks are exact. Decimal HBAR only appears at interface boundaries.
pub type Tinybars = i128;

/// Amount conversion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("non-finite amount: {0}")]
    NonFinite(f64),
}

/// Convert a decimal HBAR amount to tinybars, rounding half away from zero.
#[inline]
pub fn to_tinybars(hbar: f64) -> Result<Tinybars, AmountError> {
    if !hbar.is_finite() {
        return Err(AmountError::NonFinite(hbar));
    }
    let scaled = hbar * TINYBARS_PER_HBAR as f64;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    Ok(rounded as i128)
}

/// Convert tinybars back to decimal HBAR for interface boundaries.
#[inline]
pub fn to_hbar(amount: Tinybars) -> f64 {
    amount as f64 / TINYBARS_PER_HBAR as f64
}

/// Round a probability-style price to 8 fractional digits.
#[inline]
pub fn round_price(price: f64) -> f64 {
    (price * 1e8).round() / 1e8
}

/// Scale an amount by a fraction in [0, 1], rounding half away from zero.
///
/// Used for proportional margin release and partial closes so that the
/// scaled parts of a split never exceed the whole.
#[inline]
pub fn scale(amount: Tinybars, fraction: f64) -> Tinybars {
    let scaled = amount as f64 * fraction;
    if scaled >= 0.0 {
        (scaled + 0.5).floor() as i128
    } else {
        (scaled - 0.5).ceil() as i128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(to_tinybars(1.0).unwrap(), TINYBARS_PER_HBAR);
        assert_eq!(to_tinybars(0.000000005).unwrap(), 1);
        assert_eq!(to_tinybars(-0.000000005).unwrap(), -1);
        assert_eq!(to_tinybars(0.000000004).unwrap(), 0);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(to_tinybars(f64::NAN).is_err());
        assert!(to_tinybars(f64::INFINITY).is_err());
    }

    #[test]
    fn test_round_trip() {
        let amount = to_tinybars(1234.56789012).unwrap();
        assert_eq!(amount, 123_456_789_012);
        assert!((to_hbar(amount) - 1234.56789012).abs() < 1e-9);
    }

    #[test]
    fn test_price_rounding() {
        assert_eq!(round_price(0.123456789), 0.12345679);
        assert_eq!(round_price(0.5), 0.5);
    }
}
