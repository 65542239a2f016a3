//! Least squares curve fitting over day offsets.
//!
//! Both model kinds are polynomials in the day offset `x`; a linear model is
//! simply degree 1. The fit minimises
//!
//! ```text
//! Σ (y_i - Σ_k β_k t_i^k)^2,   t_i = x_i / s
//! ```
//!
//! where `s` is the largest day offset. Rescaling keeps the columns of the
//! design matrix within `[0, 1]`, so a degree 6 fit over a few years of daily
//! data stays well conditioned. The solve goes through an SVD because the
//! design matrix is tall (more rows than columns) and may be rank deficient
//! when there are fewer distinct days than coefficients.

use nalgebra::{DMatrix, DVector};

use crate::Error;

/// The smallest polynomial degree that may be requested.
pub const MIN_POLYNOMIAL_DEGREE: u32 = 2;
/// The largest polynomial degree that may be requested.
pub const MAX_POLYNOMIAL_DEGREE: u32 = 6;
/// The degree used when none is given or it cannot be parsed.
pub const DEFAULT_POLYNOMIAL_DEGREE: u32 = 2;
/// Datasets with fewer rows than this are always fit with a straight line.
pub const MIN_POLYNOMIAL_ROWS: usize = 4;

/// Which kind of curve to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSelection {
    /// Ordinary least squares on a straight line.
    Linear,
    /// Least squares on polynomial features up to `degree`.
    Polynomial {
        /// Always within [MIN_POLYNOMIAL_DEGREE, MAX_POLYNOMIAL_DEGREE].
        degree: u32,
    },
}

impl ModelSelection {
    /// Create a polynomial selection, clamping `degree` into the allowed range.
    pub fn polynomial(degree: i64) -> Self {
        let degree = degree.clamp(
            MIN_POLYNOMIAL_DEGREE as i64,
            MAX_POLYNOMIAL_DEGREE as i64,
        ) as u32;

        Self::Polynomial { degree }
    }

    /// Pick a model from the request parameters and the dataset size.
    ///
    /// `model` is matched case-insensitively: `"linear"` selects a straight
    /// line, anything else (including nothing) a polynomial. `degree` is parsed
    /// as an integer and clamped; if it does not parse the default degree is
    /// used. Datasets with fewer than [MIN_POLYNOMIAL_ROWS] rows always get a
    /// straight line.
    pub fn from_request(model: Option<&str>, degree: Option<&str>, row_count: usize) -> Self {
        let model = model
            .map(|model| model.trim().to_lowercase())
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| "polynomial".to_owned());

        if model == "linear" || row_count < MIN_POLYNOMIAL_ROWS {
            return Self::Linear;
        }

        let degree = match degree.map(|degree| degree.trim().parse::<i64>()) {
            Some(Ok(degree)) => degree,
            Some(Err(error)) => {
                tracing::debug!(
                    "Could not parse degree, using {DEFAULT_POLYNOMIAL_DEGREE}: {error}"
                );
                DEFAULT_POLYNOMIAL_DEGREE as i64
            }
            None => DEFAULT_POLYNOMIAL_DEGREE as i64,
        };

        Self::polynomial(degree)
    }

    /// The degree of the polynomial that gets fitted.
    pub fn degree(&self) -> u32 {
        match self {
            Self::Linear => 1,
            Self::Polynomial { degree } => *degree,
        }
    }

    /// A human readable name, e.g. "Polynomial Regression (Degree 3)".
    pub fn display_name(&self) -> String {
        match self {
            Self::Linear => "Linear Regression".to_owned(),
            Self::Polynomial { degree } => format!("Polynomial Regression (Degree {degree})"),
        }
    }
}

/// A fitted polynomial that maps a day offset to a predicted amount.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    /// Coefficients of the rescaled predictor, lowest power first.
    coefficients: DVector<f64>,
    /// The divisor applied to day offsets before evaluating.
    scale: f64,
}

impl FittedModel {
    /// Fit `selection` to the points `(days[i], amounts[i])`.
    ///
    /// # Errors
    /// Returns [Error::InsufficientVariance] if `days` has fewer than two
    /// distinct values, or [Error::FitFailed] if the solve does not give
    /// finite coefficients.
    ///
    /// # Panics
    /// Panics if `days` and `amounts` differ in length.
    pub fn fit(selection: ModelSelection, days: &[i64], amounts: &[f64]) -> Result<Self, Error> {
        assert_eq!(days.len(), amounts.len(), "one amount per day offset");

        let min_day = days.iter().copied().min();
        let max_day = days.iter().copied().max();
        let scale = match min_day.zip(max_day) {
            Some((min_day, max_day)) if max_day != min_day => {
                max_day.abs().max(min_day.abs()) as f64
            }
            _ => return Err(Error::InsufficientVariance),
        };

        let columns = selection.degree() as usize + 1;
        let design = DMatrix::from_fn(days.len(), columns, |row, power| {
            (days[row] as f64 / scale).powi(power as i32)
        });
        let targets = DVector::from_column_slice(amounts);

        let coefficients = solve_least_squares(&design, &targets).ok_or(Error::FitFailed)?;

        Ok(Self {
            coefficients,
            scale,
        })
    }

    /// Predict the amount at `day`.
    pub fn predict(&self, day: i64) -> f64 {
        let t = day as f64 / self.scale;

        // Horner's method, highest power first.
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, coefficient| acc * t + coefficient)
    }

    /// Coefficients in terms of the raw day offset, lowest power first.
    ///
    /// For a linear model this is `[intercept, slope]`.
    pub fn coefficients(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(power, coefficient)| coefficient / self.scale.powi(power as i32))
            .collect()
    }
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if no tolerance yields finite coefficients.
fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tolerance in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tolerance) {
            if beta.iter().all(|value| value.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod model_selection_tests {
    use super::ModelSelection;

    #[test]
    fn linear_is_case_insensitive() {
        assert_eq!(
            ModelSelection::from_request(Some("LINEAR"), Some("5"), 100),
            ModelSelection::Linear
        );
    }

    #[test]
    fn defaults_to_degree_two_polynomial() {
        assert_eq!(
            ModelSelection::from_request(None, None, 10),
            ModelSelection::Polynomial { degree: 2 }
        );
        assert_eq!(
            ModelSelection::from_request(Some(""), None, 10),
            ModelSelection::Polynomial { degree: 2 }
        );
    }

    #[test]
    fn unknown_model_names_are_polynomial() {
        assert_eq!(
            ModelSelection::from_request(Some("cubic"), Some("3"), 10),
            ModelSelection::Polynomial { degree: 3 }
        );
    }

    #[test]
    fn degree_is_clamped() {
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("0"), 10),
            ModelSelection::Polynomial { degree: 2 }
        );
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("-4"), 10),
            ModelSelection::Polynomial { degree: 2 }
        );
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("42"), 10),
            ModelSelection::Polynomial { degree: 6 }
        );
    }

    #[test]
    fn unparseable_degree_falls_back_to_two() {
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("three"), 10),
            ModelSelection::Polynomial { degree: 2 }
        );
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("2.5"), 10),
            ModelSelection::Polynomial { degree: 2 }
        );
    }

    #[test]
    fn small_datasets_use_linear() {
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("4"), 3),
            ModelSelection::Linear
        );
        assert_eq!(
            ModelSelection::from_request(Some("polynomial"), Some("4"), 4),
            ModelSelection::Polynomial { degree: 4 }
        );
    }

    #[test]
    fn display_names_include_degree() {
        assert_eq!(ModelSelection::Linear.display_name(), "Linear Regression");
        assert_eq!(
            ModelSelection::Polynomial { degree: 3 }.display_name(),
            "Polynomial Regression (Degree 3)"
        );
        assert_eq!(ModelSelection::Linear.degree(), 1);
    }
}
