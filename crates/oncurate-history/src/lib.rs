//! oncurate-history — history log parsing, date-range grouping, text diffs and the VUS export.

pub mod diff;
pub mod error;
pub mod export;
pub mod parse;
pub mod record;
pub mod reducer;

pub use diff::{diff, render, DiffMethod, DiffOp, DiffSpan, DiffView};
pub use error::{HistoryError, Result};
pub use export::{decode_vus_list, parse_vus_tsv, vus_rows, write_vus_tsv, VusRow};
pub use parse::{parse_history, HistoryLog, ParsedRecord};
pub use record::{append_history, build_history_from_reviews};
pub use reducer::{
    get_all_gene_history_for_date_range, get_history_for_range, history_entry_strings, DateRange,
    DownloadableHistoryEntry, GroupedHistory, HistoryGroup,
};
