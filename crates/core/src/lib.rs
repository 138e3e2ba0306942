pub mod attendee;
pub mod estimate;
pub mod money;
pub mod month;
pub mod sampler;
pub mod transaction;

pub use attendee::{numeric_order, AttendeeRecord, AttendeeRoster, AttendeeSlots, ATTENDEE_SLOTS};
pub use estimate::{estimate_count, AmountBracket, EstimationPolicy};
pub use money::Yen;
pub use month::{csv_files_in, filter_by_months, latest_months, MonthKey, MonthKeyError};
pub use sampler::{sample_ids, PrimaryWeights};
pub use transaction::TransactionRow;
