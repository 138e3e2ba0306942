use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::attendee::AttendeeSlots;
use super::money::Yen;

/// Typed view of one statement row, resolved through the column aliases.
///
/// Fields the source does not carry (or that fail to parse) are `None` or
/// empty; the raw cells stay untouched in the table the row came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub date: Option<NaiveDate>,
    pub merchant: String,
    pub amount: Option<Yen>,
    pub subject: String,
    pub attendee_count: Option<u32>,
    pub attendees: AttendeeSlots,
    pub remark: String,
}

impl TransactionRow {
    /// Amount used for estimation; unparseable amounts count as zero.
    pub fn amount_or_zero(&self) -> Yen {
        self.amount.unwrap_or_default()
    }
}
