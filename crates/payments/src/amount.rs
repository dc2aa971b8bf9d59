//! Amount validation and minor-unit conversion

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, PaymentResult};

/// Currencies accepted for payment creation.
///
/// All supported currencies use two decimal places. Zero-decimal currencies
/// (JPY, KRW, ...) are deliberately outside this set: `normalize_amount`
/// always assumes a minor-unit exponent of 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Chf,
    Cad,
    Aud,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
        }
    }

    /// Map onto the Stripe SDK currency type
    pub fn stripe_currency(self) -> stripe::Currency {
        match self {
            Currency::Usd => stripe::Currency::USD,
            Currency::Eur => stripe::Currency::EUR,
            Currency::Gbp => stripe::Currency::GBP,
            Currency::Chf => stripe::Currency::CHF,
            Currency::Cad => stripe::Currency::CAD,
            Currency::Aud => stripe::Currency::AUD,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `amount` is a fixed two-decimal string (`^\d+\.\d{2}$`).
///
/// Stored amounts keep this exact format; anything else is rejected at the
/// API boundary before a provider call is made.
pub fn is_fixed_two_decimal(amount: &str) -> bool {
    let Some((whole, frac)) = amount.split_once('.') else {
        return false;
    };
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.len() == 2
        && frac.bytes().all(|b| b.is_ascii_digit())
}

/// Convert a decimal amount string into the provider's minor-unit integer
/// representation (cents).
///
/// Fails with a validation error when the string does not parse, or when the
/// parsed value is non-finite or not strictly positive.
pub fn normalize_amount(amount: &str) -> PaymentResult<i64> {
    let value: f64 = amount
        .trim()
        .parse()
        .map_err(|_| PaymentError::Validation(format!("invalid amount: {amount:?}")))?;

    if !value.is_finite() || value <= 0.0 {
        return Err(PaymentError::Validation(format!(
            "amount must be a positive number, got {amount:?}"
        )));
    }

    Ok((value * 100.0).round() as i64)
}
