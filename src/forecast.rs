//! Fits a trend to the latest (or a named) dataset and projects it forward.

use std::fs;

use axum::{
    Json,
    extract::{FromRef, Query, State},
};
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    AppState, Error,
    config::Config,
    dataset::{Dataset, format_date, parse_dataset, round_to_cents},
    regression::{FittedModel, ModelSelection},
    storage::DatasetStore,
};

/// The number of days predicted after the last observed date.
pub const FORECAST_HORIZON_DAYS: i64 = 30;

/// The state needed for forecasting.
#[derive(Debug, Clone)]
pub struct ForecastState {
    /// Where to look for uploaded datasets.
    pub config: Config,
}

impl FromRef<AppState> for ForecastState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            config: state.config.clone(),
        }
    }
}

/// The query parameters of the forecast endpoint.
///
/// Every field is kept as raw text so that bad values fall back to defaults
/// instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    /// `"linear"` or `"polynomial"`, defaults to polynomial.
    pub model: Option<String>,
    /// The polynomial degree, clamped to 2..=6, defaults to 2.
    pub degree: Option<String>,
    /// The dataset to forecast, defaults to the most recently modified upload.
    pub dataset: Option<String>,
}

/// Dates and values as parallel arrays: `values[i]` belongs to `labels[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Dates formatted as `YYYY-MM-DD`.
    pub labels: Vec<String>,
    /// Amounts rounded to two decimal places.
    pub values: Vec<f64>,
}

/// The response body of the forecast endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    /// The display name of the fitted model.
    pub model_used: String,
    /// The degree of the fitted polynomial, 1 for linear regression.
    pub degree: u32,
    /// The dataset the model was fitted to.
    pub dataset: String,
    /// The number of rows the model was fitted to.
    pub points_trained: usize,
    /// The cleaned historical data.
    pub past: Series,
    /// The predictions for the days after the last observed date.
    pub forecast: Series,
}

/// Route handler for forecasting the next 30 days of an uploaded dataset.
pub async fn get_forecast(
    State(state): State<ForecastState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResult>, Error> {
    let store = DatasetStore::new(&state.config);
    let stored = store.resolve(query.dataset.as_deref())?;

    tracing::info!("Forecasting dataset {:?}", stored.name);

    let contents = fs::read(&stored.path)?;
    let dataset = parse_dataset(&contents)?;
    let selection = ModelSelection::from_request(
        query.model.as_deref(),
        query.degree.as_deref(),
        dataset.len(),
    );

    let result = forecast(&dataset, selection, &stored.name)?;

    tracing::info!(
        "Fitted {} to {} points from {:?}",
        result.model_used,
        result.points_trained,
        result.dataset
    );

    Ok(Json(result))
}

/// Fit `selection` to `dataset` and predict the next [FORECAST_HORIZON_DAYS] days.
///
/// `dataset_name` is echoed back in the result.
///
/// # Errors
/// - [Error::InsufficientVariance] if every record falls on the same day.
/// - [Error::FitFailed] if the least squares solve fails.
/// - [Error::DateOutOfRange] if a forecast date cannot be represented.
pub fn forecast(
    dataset: &Dataset,
    selection: ModelSelection,
    dataset_name: &str,
) -> Result<ForecastResult, Error> {
    if dataset.distinct_days() < 2 {
        return Err(Error::InsufficientVariance);
    }

    let days = dataset.day_offsets();
    let model = FittedModel::fit(selection, &days, &dataset.amounts())?;
    tracing::debug!("Fitted coefficients: {:?}", model.coefficients());

    let past = Series {
        labels: dataset
            .records()
            .iter()
            .map(|record| format_date(record.date))
            .collect::<Result<_, _>>()?,
        values: dataset
            .records()
            .iter()
            .map(|record| round_to_cents(record.amount))
            .collect(),
    };

    let last_day = (dataset.max_date() - dataset.min_date()).whole_days();
    let mut future = Series {
        labels: Vec::with_capacity(FORECAST_HORIZON_DAYS as usize),
        values: Vec::with_capacity(FORECAST_HORIZON_DAYS as usize),
    };

    for step in 1..=FORECAST_HORIZON_DAYS {
        let date = dataset
            .max_date()
            .checked_add(Duration::days(step))
            .ok_or(Error::DateOutOfRange)?;

        future.labels.push(format_date(date)?);
        future
            .values
            .push(round_to_cents(model.predict(last_day + step)));
    }

    Ok(ForecastResult {
        model_used: selection.display_name(),
        degree: selection.degree(),
        dataset: dataset_name.to_owned(),
        points_trained: dataset.len(),
        past,
        forecast: future,
    })
}


#[cfg(test)]
mod get_forecast_tests {
    use axum::{
        Json,
        extract::{Query, State},
    };

    use crate::{
        Config, Error,
        forecast::{ForecastQuery, ForecastState, get_forecast},
        test_utils::{LINEAR_CSV, QUADRATIC_CSV, TempDir},
    };

    fn state_for(temp_dir: &TempDir) -> ForecastState {
        ForecastState {
            config: Config::with_upload_directory(temp_dir.path()),
        }
    }

    fn query(model: Option<&str>, degree: Option<&str>, dataset: Option<&str>) -> ForecastQuery {
        ForecastQuery {
            model: model.map(str::to_owned),
            degree: degree.map(str::to_owned),
            dataset: dataset.map(str::to_owned),
        }
    }

    #[tokio::test]
    async fn forecasts_latest_upload() {
        let temp_dir = TempDir::new();
        temp_dir.write_with_age(
            "old.csv",
            QUADRATIC_CSV,
            std::time::Duration::from_secs(300),
        );
        temp_dir.write("new.csv", LINEAR_CSV);

        let Json(result) = get_forecast(
            State(state_for(&temp_dir)),
            Query(query(Some("linear"), None, None)),
        )
        .await
        .unwrap();

        assert_eq!(result.dataset, "new.csv");
        assert_eq!(result.points_trained, 5);
    }

    #[tokio::test]
    async fn explicit_dataset_overrides_latest() {
        let temp_dir = TempDir::new();
        temp_dir.write_with_age(
            "old.csv",
            QUADRATIC_CSV,
            std::time::Duration::from_secs(300),
        );
        temp_dir.write("new.csv", LINEAR_CSV);

        let Json(result) = get_forecast(
            State(state_for(&temp_dir)),
            Query(query(None, Some("3"), Some("old.csv"))),
        )
        .await
        .unwrap();

        assert_eq!(result.dataset, "old.csv");
        assert_eq!(result.points_trained, 6);
        assert_eq!(result.model_used, "Polynomial Regression (Degree 3)");
    }

    #[tokio::test]
    async fn polynomial_on_small_dataset_falls_back_to_linear() {
        let temp_dir = TempDir::new();
        temp_dir.write("small.csv", "Date,Amount\n2024-01-01,1\n2024-01-02,2\n2024-01-03,3\n");

        let Json(result) = get_forecast(
            State(state_for(&temp_dir)),
            Query(query(Some("polynomial"), Some("5"), None)),
        )
        .await
        .unwrap();

        assert_eq!(result.model_used, "Linear Regression");
        assert_eq!(result.degree, 1);
    }

    #[tokio::test]
    async fn bad_degree_is_echoed_as_default() {
        let temp_dir = TempDir::new();
        temp_dir.write("q.csv", QUADRATIC_CSV);

        let Json(result) = get_forecast(
            State(state_for(&temp_dir)),
            Query(query(Some("polynomial"), Some("lots"), None)),
        )
        .await
        .unwrap();

        assert_eq!(result.degree, 2);
    }

    #[tokio::test]
    async fn no_uploads_is_no_data() {
        let temp_dir = TempDir::new();

        let error = get_forecast(State(state_for(&temp_dir)), Query(ForecastQuery::default()))
            .await
            .unwrap_err();

        assert_eq!(error, Error::NoData);
    }

    #[tokio::test]
    async fn missing_columns_is_reported() {
        let temp_dir = TempDir::new();
        temp_dir.write("bad.csv", "When,HowMuch\n2024-01-01,1\n");

        let error = get_forecast(State(state_for(&temp_dir)), Query(ForecastQuery::default()))
            .await
            .unwrap_err();

        assert_eq!(error, Error::MissingColumns);
    }

    #[tokio::test]
    async fn unparseable_rows_are_an_empty_dataset() {
        let temp_dir = TempDir::new();
        temp_dir.write("bad.csv", "Date,Amount\nsoon,lots\n");

        let error = get_forecast(State(state_for(&temp_dir)), Query(ForecastQuery::default()))
            .await
            .unwrap_err();

        assert_eq!(error, Error::EmptyDataset);
    }
}
