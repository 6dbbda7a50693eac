//! Diff-log serialization
//!
//! Every archive carries a record-oriented text table describing the
//! changes it captured, one row per file:
//!
//! ```text
//! filename,modtype,diff
//! doc1.txt,+,8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4
//! subdir/doc2.txt,*,a1fce4363854ff888cff4b8e7875d600c2682390412a8cf79b37d0b11148b0fa
//! old.txt,-,
//! ```
//!
//! `modtype` is `+` (added), `*` (modified) or `-` (deleted); `diff` holds
//! the strategy-encoded state and is empty for deleted rows. Fields
//! containing the delimiter, quotes or newlines are double-quoted with
//! doubled inner quotes.
//!
//! Parsing is strict: unknown symbols, missing fields or a wrong header are
//! diff-log errors, never silently skipped rows.

use crate::error::{Result, StrataError};
use crate::strategy::DetectionStrategy;
use crate::types::{ChangeKind, DiffEntry, DiffTree};
use crate::utils::{from_wire_path, to_wire_path};

/// Header row naming the three fields
pub const HEADER: &str = "filename,modtype,diff";

/// Standard file name of the diff log inside an archive
pub const DIFF_LOG_NAME: &str = "diff-log.csv";

/// One row of a diff log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    /// Relative path in wire form (`/`-separated)
    pub filename: String,
    /// Change classification
    pub kind: ChangeKind,
    /// Strategy-encoded state; `None` for deleted rows
    pub diff: Option<String>,
}

/// Serialize a diff tree into the diff-log text form
///
/// Rows appear in flattened tree order, which is deterministic.
pub fn serialize(tree: &DiffTree) -> Result<String> {
    let mut out = String::from(HEADER);
    out.push('\n');
    for (rel_path, entry) in tree.flatten() {
        let filename = to_wire_path(&rel_path)?;
        out.push_str(&escape_field(&filename));
        out.push(',');
        out.push(entry.kind.symbol());
        out.push(',');
        if let Some(state) = &entry.state {
            out.push_str(&escape_field(&state.encode()));
        }
        out.push('\n');
    }
    Ok(out)
}

/// Parse diff-log text into records
pub fn parse(text: &str) -> Result<Vec<DiffRecord>> {
    let mut rows = parse_rows(text)?.into_iter();

    match rows.next() {
        Some(header) if header == ["filename", "modtype", "diff"] => {}
        Some(header) => {
            return Err(StrataError::diff_log(format!(
                "unexpected diff log header: {:?}",
                header
            )));
        }
        None => return Err(StrataError::diff_log("empty diff log")),
    }

    let mut records = Vec::new();
    for row in rows {
        if row.len() != 3 {
            return Err(StrataError::diff_log(format!(
                "expected 3 fields, got {}: {:?}",
                row.len(),
                row
            )));
        }
        let mut symbols = row[1].chars();
        let kind = match (symbols.next(), symbols.next()) {
            (Some(symbol), None) => ChangeKind::from_symbol(symbol).ok_or_else(|| {
                StrataError::diff_log(format!("unknown modtype: {:?}", row[1]))
            })?,
            _ => return Err(StrataError::diff_log(format!("unknown modtype: {:?}", row[1]))),
        };
        let diff = if row[2].is_empty() {
            None
        } else {
            Some(row[2].clone())
        };
        match kind {
            ChangeKind::Deleted if diff.is_some() => {
                return Err(StrataError::diff_log(format!(
                    "deleted row for {:?} carries a state",
                    row[0]
                )));
            }
            ChangeKind::Added | ChangeKind::Modified if diff.is_none() => {
                return Err(StrataError::diff_log(format!(
                    "{} row for {:?} is missing its state",
                    kind, row[0]
                )));
            }
            _ => {}
        }
        records.push(DiffRecord {
            filename: row[0].clone(),
            kind,
            diff,
        });
    }
    Ok(records)
}

/// Rebuild a diff tree from parsed records, decoding states with the
/// active strategy
pub fn records_to_tree(
    records: &[DiffRecord],
    strategy: &dyn DetectionStrategy,
) -> Result<DiffTree> {
    let mut tree = DiffTree::new();
    for record in records {
        let path = from_wire_path(&record.filename)?;
        let state = match &record.diff {
            Some(text) => Some(strategy.decode(text)?),
            None => None,
        };
        tree.insert(DiffEntry {
            path,
            kind: record.kind,
            state,
        })?;
    }
    Ok(tree)
}

/// Quote a field if it contains the delimiter, a quote or a line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        let mut out = String::with_capacity(field.len() + 2);
        out.push('"');
        for c in field.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
        out
    } else {
        field.to_string()
    }
}

/// Split text into rows of unquoted fields
fn parse_rows(text: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '"' => return Err(StrataError::diff_log("stray quote in unquoted field")),
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(StrataError::diff_log("unterminated quoted field"));
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
