use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Yen;

/// Floor applied when the attendee count is derived from the cost per head.
pub const MIN_FALLBACK_ATTENDEES: u32 = 2;

/// An amount range (inclusive, in yen) mapped to an attendee-count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBracket {
    pub low: i64,
    pub high: i64,
    pub min_attendees: u32,
    pub max_attendees: u32,
}

impl AmountBracket {
    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= Decimal::from(self.low) && amount <= Decimal::from(self.high)
    }
}

/// Draws uniformly from `[min, max]`; a reversed range collapses to `min`.
fn draw_between<R: Rng + ?Sized>(rng: &mut R, min: u32, max: u32) -> u32 {
    if max <= min {
        min
    } else {
        rng.random_range(min..=max)
    }
}

/// Estimates how many people a transaction covered.
///
/// 1. With a bracket table, the first bracket containing `amount` decides
///    the range the count is drawn from.
/// 2. With a table but no matching bracket, the count is
///    `max(2, floor(amount / cost_per_person))`, capped at `max_attendees`.
/// 3. Without a table, the count is drawn from `[min_attendees, max_attendees]`.
pub fn estimate_count<R: Rng + ?Sized>(
    amount: Decimal,
    min_attendees: u32,
    max_attendees: u32,
    brackets: Option<&[AmountBracket]>,
    cost_per_person: Decimal,
    rng: &mut R,
) -> u32 {
    let Some(brackets) = brackets else {
        return draw_between(rng, min_attendees, max_attendees);
    };

    if let Some(bracket) = brackets.iter().find(|b| b.contains(amount)) {
        return draw_between(rng, bracket.min_attendees, bracket.max_attendees);
    }

    let per_head = if cost_per_person > Decimal::ZERO {
        (amount / cost_per_person)
            .floor()
            .to_i64()
            .unwrap_or(i64::MAX)
            .clamp(0, i64::from(u32::MAX)) as u32
    } else {
        0
    };
    per_head.max(MIN_FALLBACK_ATTENDEES).min(max_attendees)
}

/// The estimation parameters for a run, passed explicitly per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationPolicy {
    pub min_attendees: u32,
    pub max_attendees: u32,
    pub brackets: Option<Vec<AmountBracket>>,
    pub cost_per_person: Decimal,
}

impl Default for EstimationPolicy {
    fn default() -> Self {
        Self {
            min_attendees: 2,
            max_attendees: 8,
            brackets: None,
            cost_per_person: Decimal::from(3000),
        }
    }
}

impl EstimationPolicy {
    pub fn estimate<R: Rng + ?Sized>(&self, amount: Yen, rng: &mut R) -> u32 {
        estimate_count(
            amount.amount(),
            self.min_attendees,
            self.max_attendees,
            self.brackets.as_deref(),
            self.cost_per_person,
            rng,
        )
    }
}
