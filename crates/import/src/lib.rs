pub mod csv;
pub mod diagnostic;
pub mod encoding;
pub mod header;
pub mod roster;
pub mod rules;

pub use self::csv::{
    parse_amount, parse_date, read_statement, read_statement_with, transaction_view,
    unique_output_path, write_statement, FieldError, ReadError, StatementFile, StatementTable,
    WriteError,
};
pub use diagnostic::Diagnostic;
pub use encoding::{AnalyzerError, CharsetAnalyzer, CharsetGuess, Detection, StatisticalAnalyzer, TextEncoding};
pub use header::{ColumnAlias, ColumnMap};
pub use roster::{load_roster, RosterError, NAMELIST_FILE};
pub use rules::{MatchType, RelevanceFilter, RelevanceRule};
