//! Parsing and cleaning of uploaded transaction CSVs.

use std::collections::BTreeSet;

use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::Error;

/// The column holding transaction dates.
pub const DATE_COLUMN: &str = "Date";
/// The column holding transaction amounts.
pub const AMOUNT_COLUMN: &str = "Amount";

const ISO_DATE_FORMAT: &[BorrowedFormatItem] = format_description!("[year]-[month]-[day]");

const DATE_FORMATS: &[&[BorrowedFormatItem]] = &[
    ISO_DATE_FORMAT,
    format_description!("[year]/[month]/[day]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[year][month][day]"),
];

/// A single dated amount from an uploaded CSV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionRecord {
    /// The day the transaction happened.
    pub date: Date,
    /// The signed amount of the transaction.
    pub amount: f64,
}

/// Cleaned transaction records sorted by date, ready for model fitting.
///
/// A [Dataset] always holds at least one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<TransactionRecord>,
}

impl Dataset {
    /// Sort `records` by date and wrap them.
    ///
    /// The sort is stable, so records on the same day keep their file order.
    /// Duplicates are kept.
    ///
    /// # Errors
    /// Returns [Error::EmptyDataset] if `records` is empty.
    pub fn new(mut records: Vec<TransactionRecord>) -> Result<Self, Error> {
        if records.is_empty() {
            return Err(Error::EmptyDataset);
        }

        records.sort_by_key(|record| record.date);

        Ok(Self { records })
    }

    /// The records in ascending date order.
    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The earliest date in the dataset.
    pub fn min_date(&self) -> Date {
        self.records[0].date
    }

    /// The latest date in the dataset.
    pub fn max_date(&self) -> Date {
        self.records[self.records.len() - 1].date
    }

    /// Whole days between each record's date and the earliest date, in record order.
    pub fn day_offsets(&self) -> Vec<i64> {
        let min_date = self.min_date();

        self.records
            .iter()
            .map(|record| (record.date - min_date).whole_days())
            .collect()
    }

    /// The number of distinct day offsets, i.e. distinct dates.
    pub fn distinct_days(&self) -> usize {
        self.records
            .iter()
            .map(|record| record.date)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// The amounts in record order.
    pub fn amounts(&self) -> Vec<f64> {
        self.records.iter().map(|record| record.amount).collect()
    }
}

/// Parse CSV text into a sorted [Dataset].
///
/// Rows whose `Date` or `Amount` cell cannot be parsed are dropped.
///
/// # Errors
/// - [Error::MissingColumns] if the header lacks `Date` or `Amount`.
/// - [Error::EmptyDataset] if no rows survive parsing.
/// - [Error::InvalidCSV] if the text cannot be read as CSV at all.
pub fn parse_dataset(text: &[u8]) -> Result<Dataset, Error> {
    let mut reader = csv_reader(text);
    let (date_index, amount_index) = find_required_columns(reader.headers()?)?;

    let mut records = Vec::new();
    let mut dropped_rows = 0;

    for row in reader.records() {
        let row = row?;
        let record = row
            .get(date_index)
            .and_then(parse_date)
            .zip(row.get(amount_index).and_then(parse_amount))
            .map(|(date, amount)| TransactionRecord { date, amount });

        match record {
            Some(record) => records.push(record),
            None => dropped_rows += 1,
        }
    }

    if dropped_rows > 0 {
        tracing::debug!("Dropped {dropped_rows} rows with an unparseable date or amount");
    }

    Dataset::new(records)
}

/// Check that the header row of `text` has the `Date` and `Amount` columns.
///
/// Only the header is read, the rest of the file is not validated.
///
/// # Errors
/// - [Error::MissingColumns] if either column is missing.
/// - [Error::InvalidCSV] if the header cannot be read.
pub fn validate_header(text: &[u8]) -> Result<(), Error> {
    let mut reader = csv_reader(text);
    find_required_columns(reader.headers()?)?;

    Ok(())
}

/// A CSV reader that tolerates ragged rows; short rows simply fail to parse later.
pub(crate) fn csv_reader(text: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text)
}

fn find_required_columns(headers: &csv::StringRecord) -> Result<(usize, usize), Error> {
    let position = |name: &str| headers.iter().position(|header| header == name);

    position(DATE_COLUMN)
        .zip(position(AMOUNT_COLUMN))
        .ok_or(Error::MissingColumns)
}

/// Parse a date cell, accepting ISO dates, slashed dates and date-times.
///
/// Date-times such as `2024-01-31T09:30:00` or `2024-01-31 09:30` are
/// truncated to their date.
pub fn parse_date(text: &str) -> Option<Date> {
    let text = text.trim();

    let date_part = match text.get(..10) {
        Some(prefix) if text[10..].starts_with(['T', ' ']) => prefix,
        _ => text,
    };

    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(date_part, *format).ok())
}

/// Parse an amount cell, rejecting anything that is not a finite number.
pub fn parse_amount(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite())
}

/// Format `date` as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> Result<String, Error> {
    date.format(ISO_DATE_FORMAT)
        .map_err(|error| Error::Internal(format!("could not format date {date}: {error}")))
}

/// Round `value` to two decimal places, with exact halves going to the even cent.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
