//! Price arithmetic
//!
//! Prices are exact decimals with two fractional digits. The sortable key is the
//! price in whole cents, zero-padded to a fixed width so that string order and
//! numeric order agree over the supported range.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Digits in an encoded price sort key.
pub const PRICE_SORT_KEY_WIDTH: usize = 10;

/// Smallest accepted price (one cent).
pub const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest accepted price; its cent value fills the sort key width exactly.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// How an adjustment value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentMode {
    Absolute,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Increase,
    Decrease,
}

/// A price change applied uniformly to a set of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAdjustment {
    pub mode: AdjustmentMode,
    pub direction: AdjustmentDirection,
    pub value: Decimal,
}

impl PriceAdjustment {
    pub fn new(mode: AdjustmentMode, direction: AdjustmentDirection, value: Decimal) -> Self {
        Self {
            mode,
            direction,
            value,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.value.is_sign_negative() {
            return Err(AppError::Validation(
                "Adjustment value must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the adjustment and validate that the result is still a sellable price.
    pub fn apply(&self, price: Decimal) -> Result<Decimal, AppError> {
        self.validate()?;
        let adjusted = adjust_price(self.mode, self.direction, price, self.value);
        validate_price(adjusted)?;
        Ok(adjusted)
    }
}

/// Round to cents, halves away from zero.
pub fn round_to_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute an adjusted price.
///
/// Percentage mode scales by `1 ± value/100`, absolute mode adds or subtracts
/// `value`. The result is rounded to two decimal places. Rounding is not
/// invertible: increasing then decreasing by the same percentage need not
/// return the original price.
pub fn adjust_price(
    mode: AdjustmentMode,
    direction: AdjustmentDirection,
    price: Decimal,
    value: Decimal,
) -> Decimal {
    let adjusted = match mode {
        AdjustmentMode::Percentage => {
            let factor = value / Decimal::ONE_HUNDRED;
            match direction {
                AdjustmentDirection::Increase => price * (Decimal::ONE + factor),
                AdjustmentDirection::Decrease => price * (Decimal::ONE - factor),
            }
        }
        AdjustmentMode::Absolute => match direction {
            AdjustmentDirection::Increase => price + value,
            AdjustmentDirection::Decrease => price - value,
        },
    };
    round_to_cents(adjusted)
}

/// Check that a price lies within `MIN_PRICE..=MAX_PRICE` after rounding to cents.
pub fn validate_price(price: Decimal) -> Result<(), AppError> {
    let rounded = round_to_cents(price);
    if rounded < MIN_PRICE {
        return Err(AppError::Validation(format!(
            "Price must be positive, got {}",
            price
        )));
    }
    if rounded > MAX_PRICE {
        return Err(AppError::Validation(format!(
            "Price {} exceeds the maximum supported price of {}",
            price, MAX_PRICE
        )));
    }
    Ok(())
}

/// Encode a price as a fixed-width string of whole cents.
pub fn price_sort_key(price: Decimal) -> Result<String, AppError> {
    validate_price(price)?;
    let cents = (round_to_cents(price) * Decimal::ONE_HUNDRED)
        .to_u64()
        .ok_or_else(|| AppError::Validation(format!("Price {} is not representable", price)))?;
    Ok(format!("{:0width$}", cents, width = PRICE_SORT_KEY_WIDTH))
}

/// Decode a sort key back to a price; used when building range bounds.
pub fn price_from_sort_key(key: &str) -> Option<Decimal> {
    if key.len() != PRICE_SORT_KEY_WIDTH || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let cents: i64 = key.parse().ok()?;
    Some(Decimal::new(cents, 2))
}

/// Serde adapter storing prices as JSON numbers, matching the persisted layout.
///
/// Values read back are re-rounded to cents so binary float noise never
/// reaches arithmetic.
pub mod serde_price {
    use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
    use rust_decimal::Decimal;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::round_to_cents;

    pub fn serialize<S>(price: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = price
            .to_f64()
            .ok_or_else(|| serde::ser::Error::custom("price is not representable as f64"))?;
        serializer.serialize_f64(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Number::deserialize(deserializer)?;
        let parsed = match raw.as_i64() {
            Some(whole) => Decimal::from(whole),
            None => raw
                .as_f64()
                .and_then(Decimal::from_f64)
                .ok_or_else(|| D::Error::custom(format!("invalid price {}", raw)))?,
        };
        Ok(round_to_cents(parsed))
    }
}
