//! Route handler that lists the rows of the expenses CSV as JSON.

use std::{collections::BTreeMap, fs, io::ErrorKind, path::PathBuf};

use axum::{
    Json,
    extract::{FromRef, State},
};
use serde_json::{Map, Number, Value};

use crate::{
    AppState, Error,
    dataset::{DATE_COLUMN, csv_reader, format_date, parse_amount, parse_date},
};

/// The state needed for listing expenses.
#[derive(Debug, Clone)]
pub struct ExpensesState {
    /// The CSV file to list.
    pub expenses_path: PathBuf,
}

impl FromRef<AppState> for ExpensesState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            expenses_path: state.config.expenses_path.clone(),
        }
    }
}

/// The rows of the expenses file keyed by their zero-based row index.
pub type ExpenseRows = BTreeMap<usize, Map<String, Value>>;

/// Route handler for listing every row of the expenses file.
pub async fn get_expenses(
    State(state): State<ExpensesState>,
) -> Result<Json<ExpenseRows>, Error> {
    let contents = fs::read(&state.expenses_path).map_err(|error| match error.kind() {
        ErrorKind::NotFound => {
            tracing::debug!("Expenses file {:?} does not exist", state.expenses_path);
            Error::ExpensesNotFound
        }
        _ => error.into(),
    })?;

    let rows = parse_expenses(&contents)?;
    tracing::debug!("Listing {} expenses", rows.len());

    Ok(Json(rows))
}

/// Parse expenses CSV text into JSON objects keyed by row index.
///
/// The `Date` column is normalised to `YYYY-MM-DD` where it parses. Other
/// cells become integers or floats where they parse as finite numbers,
/// `null` when empty and strings otherwise. Missing trailing cells are left out of the row.
fn parse_expenses(text: &[u8]) -> Result<ExpenseRows, Error> {
    let mut reader = csv_reader(text);
    let headers = reader.headers()?.clone();
    let mut rows = ExpenseRows::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, cell)| {
                cell_to_json(header, cell).map(|value| (header.to_owned(), value))
            })
            .collect::<Result<Map<_, _>, Error>>()?;

        rows.insert(index, row);
    }

    Ok(rows)
}

fn cell_to_json(header: &str, cell: &str) -> Result<Value, Error> {
    if header == DATE_COLUMN {
        return match parse_date(cell) {
            Some(date) => Ok(Value::String(format_date(date)?)),
            None => Ok(Value::String(cell.to_owned())),
        };
    }

    if cell.trim().is_empty() {
        return Ok(Value::Null);
    }

    if let Ok(integer) = cell.trim().parse::<i64>() {
        return Ok(Value::Number(Number::from(integer)));
    }

    Ok(parse_amount(cell)
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_owned())))
}
