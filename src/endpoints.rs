//! The API endpoints URIs.

/// The route for uploading a CSV file.
pub const UPLOAD: &str = "/upload";
/// The route for listing the rows of the expenses file.
pub const EXPENSES_API: &str = "/api/expenses";
/// The route for forecasting an uploaded dataset.
pub const FORECAST_API: &str = "/api/forecast";
