//! Input list loader.
//!
//! Accepts a CSV file. When a header row names a `number` column (any
//! case), that column is the phone number and every other column travels
//! along as metadata. Otherwise the first column is the number; a first
//! row whose first field holds digits is treated as data, not a header.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info};

use crate::models::item::ValidationItem;
use crate::{AppError, Result};

/// Load input items from the CSV file at `path`, preserving input order.
///
/// # Errors
///
/// Returns `AppError::Input` if the file cannot be opened or parsed.
pub fn load_items(path: &Path) -> Result<Vec<ValidationItem>> {
    let file = File::open(path)
        .map_err(|e| AppError::Input(format!("failed to open {}: {e}", path.display())))?;
    let items = parse_items(file)?;
    info!(path = %path.display(), items = items.len(), "loaded input list");
    Ok(items)
}

/// Parse input items from any CSV reader.
///
/// Rows with a blank number are skipped.
///
/// # Errors
///
/// Returns `AppError::Input` if the CSV is malformed.
pub fn parse_items<R: Read>(reader: R) -> Result<Vec<ValidationItem>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let mut records = rdr.records();
    let Some(first) = records.next().transpose()? else {
        return Ok(Vec::new());
    };

    let number_column = first
        .iter()
        .position(|field| field.eq_ignore_ascii_case("number"));
    let first_is_data = number_column.is_none()
        && first
            .get(0)
            .is_some_and(|field| field.chars().any(|c| c.is_ascii_digit()));

    let mut items = Vec::new();
    let mut skipped = 0_usize;
    let (header, column) = if first_is_data {
        push_item(&mut items, &mut skipped, &first, 0, None);
        (None, 0)
    } else {
        (Some(first), number_column.unwrap_or(0))
    };

    for record in records {
        push_item(&mut items, &mut skipped, &record?, column, header.as_ref());
    }
    if skipped > 0 {
        debug!(skipped, "skipped rows without a number");
    }
    Ok(items)
}

fn push_item(
    items: &mut Vec<ValidationItem>,
    skipped: &mut usize,
    record: &StringRecord,
    column: usize,
    header: Option<&StringRecord>,
) {
    let number = record.get(column).unwrap_or_default();
    if number.is_empty() {
        *skipped += 1;
        return;
    }

    let metadata: BTreeMap<String, String> = header
        .map(|header| {
            header
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|&(i, (name, value))| i != column && !name.is_empty() && !value.is_empty())
                .map(|(_, (name, value))| (name.to_owned(), value.to_owned()))
                .collect()
        })
        .unwrap_or_default();

    items.push(ValidationItem {
        number: number.to_owned(),
        metadata,
    });
}
