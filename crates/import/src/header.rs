//! Column aliases and header-row location.
//!
//! Card exports differ in how they spell the same column, and many carry a
//! statement banner above the real header. The header is found by plain
//! substring search over raw lines: quoting or mis-decoded text around the
//! header must not stop it from being recognized.
//!
//! Header cells are never renamed. Alias resolution produces a
//! [`ColumnMap`] from canonical names to column positions, so the source
//! spelling survives into the output file.

/// How many leading lines are searched for the header row.
pub const HEADER_SCAN_LIMIT: usize = 20;

pub const DATE: &str = "利用日";
pub const MERCHANT: &str = "ご利用店名及び商品名";
pub const AMOUNT: &str = "利用金額";
pub const SUBJECT: &str = "科目＆No.";
pub const REMARK: &str = "備考";
/// Attendee-count column appended to processed output.
pub const ATTENDEE_COUNT: &str = "人数";

/// A canonical column and the spellings that resolve to it, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnAlias {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

/// Columns a statement must carry.
///
/// Saison exports put the expense subject in 備考, so it is the last-resort
/// spelling of the subject column.
pub static REQUIRED_COLUMNS: &[ColumnAlias] = &[
    ColumnAlias { canonical: DATE, aliases: &["利用日", "ご利用日", "ご利用年月日"] },
    ColumnAlias {
        canonical: MERCHANT,
        aliases: &["ご利用店名及び商品名", "ご利用店名", "利用店名", "ご利用先"],
    },
    ColumnAlias { canonical: AMOUNT, aliases: &["利用金額", "ご利用金額"] },
    ColumnAlias {
        canonical: SUBJECT,
        aliases: &["科目＆No.", "科目&No.", "科目＆Ｎｏ．", "科目", "備考"],
    },
];

pub static OPTIONAL_COLUMNS: &[ColumnAlias] =
    &[ColumnAlias { canonical: REMARK, aliases: &["備考", "摘要"] }];

fn line_matches(line: &str, columns: &[ColumnAlias]) -> bool {
    columns
        .iter()
        .all(|col| col.aliases.iter().any(|alias| line.contains(alias)))
}

/// Zero-based index of the first of the leading [`HEADER_SCAN_LIMIT`] lines
/// that mentions an alias of every column in `columns`.
pub fn locate_header<S: AsRef<str>>(lines: &[S], columns: &[ColumnAlias]) -> Option<usize> {
    lines
        .iter()
        .take(HEADER_SCAN_LIMIT)
        .position(|line| line_matches(line.as_ref(), columns))
}

/// Trims whitespace and any stray byte-order mark from header cells.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect()
}

/// Canonical column name to position, resolved once per file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    resolved: Vec<(&'static str, usize)>,
}

impl ColumnMap {
    /// Resolves every known column against normalized headers. For each
    /// canonical column the earliest alias in priority order wins.
    pub fn resolve(headers: &[String]) -> Self {
        let resolved = REQUIRED_COLUMNS
            .iter()
            .chain(OPTIONAL_COLUMNS)
            .filter_map(|col| {
                col.aliases
                    .iter()
                    .find_map(|alias| headers.iter().position(|h| h == alias))
                    .map(|idx| (col.canonical, idx))
            })
            .collect();
        Self { resolved }
    }

    pub fn get(&self, canonical: &str) -> Option<usize> {
        self.resolved
            .iter()
            .find(|(name, _)| *name == canonical)
            .map(|(_, idx)| *idx)
    }

    /// Required canonical columns no alias resolved to.
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_COLUMNS
            .iter()
            .map(|col| col.canonical)
            .filter(|name| self.get(name).is_none())
            .collect()
    }
}
