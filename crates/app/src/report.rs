//! HTML summary written next to each processed statement.

use saisonxform_core::{numeric_order, AttendeeRoster, TransactionRow, Yen};
use saisonxform_import::unique_output_path;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One line of the attendee table. Name, title and company are blank for
/// IDs the roster does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeLine {
    pub id: String,
    pub name: String,
    pub title: String,
    pub company: String,
}

/// Every distinct attendee ID across `rows`, in numeric order, joined
/// against the roster.
pub fn unique_attendees(rows: &[TransactionRow], roster: &AttendeeRoster) -> Vec<AttendeeLine> {
    let ids: BTreeSet<&str> = rows.iter().flat_map(|r| r.attendees.filled()).collect();
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_by(|a, b| numeric_order(a, b));

    ids.into_iter()
        .map(|id| match roster.get(id) {
            Some(record) => AttendeeLine {
                id: id.to_string(),
                name: record.name.clone(),
                title: record.title.clone(),
                company: record.company.clone(),
            },
            None => AttendeeLine {
                id: id.to_string(),
                name: String::new(),
                title: String::new(),
                company: String::new(),
            },
        })
        .collect()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders the report for the rows that received attendees.
pub fn render_report(source_name: &str, rows: &[TransactionRow], roster: &AttendeeRoster) -> String {
    let total: Yen = rows.iter().map(TransactionRow::amount_or_zero).sum();
    let attendees = unique_attendees(rows, roster);
    let title = escape(source_name);

    let mut html = String::new();
    // Writing into a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"ja\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n\
         <p>取引件数: {count} / 合計金額: {total}</p>\n",
        count = rows.len(),
        total = escape(&total.to_string()),
    );

    html.push_str("<h2>取引一覧</h2>\n<table>\n<thead><tr>");
    for head in ["利用日", "ご利用店名及び商品名", "利用金額", "科目", "人数", "出席者ID"] {
        let _ = write!(html, "<th>{head}</th>");
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        let date = row.date.map(|d| d.format("%Y/%m/%d").to_string()).unwrap_or_default();
        let amount = row.amount.map(|a| a.to_string()).unwrap_or_default();
        let count = row.attendee_count.map(|c| c.to_string()).unwrap_or_default();
        let ids = row.attendees.filled().collect::<Vec<_>>().join(", ");
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&date),
            escape(&row.merchant),
            escape(&amount),
            escape(&row.subject),
            escape(&count),
            escape(&ids),
        );
    }
    html.push_str("</tbody>\n</table>\n");

    html.push_str("<h2>出席者一覧</h2>\n<table>\n<thead><tr><th>ID</th><th>Name</th><th>Title</th><th>Company</th></tr></thead>\n<tbody>\n");
    for line in &attendees {
        let _ = writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&line.id),
            escape(&line.name),
            escape(&line.title),
            escape(&line.company),
        );
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

/// Writes `html` to `path`, or to the first free `_2`, `_3`, … variant.
pub fn write_report(path: &Path, html: &str, handle_duplicates: bool) -> io::Result<PathBuf> {
    let target = if handle_duplicates {
        unique_output_path(path)
    } else {
        path.to_path_buf()
    };
    fs::write(&target, html)?;
    Ok(target)
}
