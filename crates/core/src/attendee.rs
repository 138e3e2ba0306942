use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Number of attendee-ID columns (`ID1`..`ID8`) carried by every output row.
pub const ATTENDEE_SLOTS: usize = 8;

/// Orders attendee IDs by numeric value; non-numeric IDs sort after all
/// numeric ones, by text.
pub fn numeric_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Exactly eight attendee-ID cells.
///
/// Non-empty entries are unique and ascending by [`numeric_order`]; empty
/// cells only ever follow them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendeeSlots([String; ATTENDEE_SLOTS]);

impl AttendeeSlots {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds slots from drawn IDs: blanks and duplicates are dropped, the
    /// rest sorted, then padded (or truncated) to eight cells.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut unique: Vec<String> = ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        unique.sort_by(|a, b| numeric_order(a, b));

        let mut slots = Self::default();
        for (slot, id) in slots.0.iter_mut().zip(unique) {
            *slot = id;
        }
        slots
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// The non-empty IDs, in slot order.
    pub fn filled(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str).filter(|s| !s.is_empty())
    }

    pub fn filled_count(&self) -> usize {
        self.filled().count()
    }

    /// Column headers `ID1`..`ID8`.
    pub fn column_names() -> Vec<String> {
        (1..=ATTENDEE_SLOTS).map(|i| format!("ID{i}")).collect()
    }
}

/// One row of `Reference/NameList.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Company", default)]
    pub company: String,
}

/// The attendee reference list, in file order.
#[derive(Debug, Clone, Default)]
pub struct AttendeeRoster {
    records: Vec<AttendeeRecord>,
    by_id: HashMap<String, usize>,
}

impl AttendeeRoster {
    pub fn new(records: Vec<AttendeeRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            by_id.entry(record.id.clone()).or_insert(idx);
        }
        Self { records, by_id }
    }

    /// Distinct IDs in file order; this is the sampling pool.
    pub fn ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&AttendeeRecord> {
        self.by_id.get(id).map(|&idx| &self.records[idx])
    }

    pub fn records(&self) -> &[AttendeeRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
