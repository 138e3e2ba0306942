use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

/// A statement amount in yen. Card exports are whole yen, but the value is
/// kept as a decimal so that refunds or odd exports never lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Yen(Decimal);

impl Yen {
    pub fn from_decimal(decimal: Decimal) -> Self {
        Yen(decimal.normalize())
    }

    pub fn from_whole(yen: i64) -> Self {
        Yen(Decimal::from(yen))
    }

    pub fn zero() -> Self {
        Yen(Decimal::ZERO)
    }

    pub fn amount(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Yen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.abs().normalize().to_string();
        let (whole, frac) = match text.split_once('.') {
            Some((w, fr)) => (w, Some(fr)),
            None => (text.as_str(), None),
        };

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        let sign = if self.0.is_sign_negative() && !self.0.is_zero() { "-" } else { "" };
        match frac {
            Some(fr) => write!(f, "{sign}¥{grouped}.{fr}"),
            None => write!(f, "{sign}¥{grouped}"),
        }
    }
}

impl Add for Yen {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Yen(self.0 + rhs.0)
    }
}

impl Sum for Yen {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Yen::zero(), |a, b| a + b)
    }
}
