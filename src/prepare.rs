//! Feature preparation: categorical encoding and standardization.
//!
//! Raw campaign records carry three identifier columns, two categorical columns
//! (age bracket, gender) and six numeric metrics. Preparation drops the
//! identifiers, maps the categories to numbers and standardizes every column
//! to zero mean and unit variance:
//!
//! ```text
//! z = (x - μ) / σ
//! ```
//!
//! The [`Standardizer`] is fitted once per dataset and kept, so cluster
//! centroids can be mapped back to original units for interpretation.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Feature columns, in matrix order.
pub const FEATURE_NAMES: [&str; 8] = [
    "age",
    "gender",
    "interest",
    "impressions",
    "clicks",
    "spent",
    "total_conversion",
    "approved_conversion",
];

/// One ad-campaign observation as it appears in the source table.
///
/// Field names follow the dataset headers, so rows deserialize straight from
/// `csv::Reader::deserialize`. Empty cells become `None` and are reported as
/// [`Error::IncompleteRecord`] during encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Ad identifier (dropped).
    pub ad_id: String,
    /// Campaign identifier (dropped).
    pub xyz_campaign_id: String,
    /// Platform campaign identifier (dropped).
    pub fb_campaign_id: String,
    /// Age bracket, e.g. `"30-34"`.
    pub age: Option<String>,
    /// Gender code.
    pub gender: Option<String>,
    /// Interest category code.
    pub interest: Option<i64>,
    /// Times the ad was shown.
    #[serde(rename = "Impressions")]
    pub impressions: Option<i64>,
    /// Clicks on the ad.
    #[serde(rename = "Clicks")]
    pub clicks: Option<i64>,
    /// Amount paid for the ad.
    #[serde(rename = "Spent")]
    pub spent: Option<f64>,
    /// Enquiries after seeing the ad.
    #[serde(rename = "Total_Conversion")]
    pub total_conversion: Option<i64>,
    /// Purchases after seeing the ad.
    #[serde(rename = "Approved_Conversion")]
    pub approved_conversion: Option<i64>,
}

/// Two-valued gender mapping: `one` encodes to 1.0, `zero` to 0.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenderMap {
    /// Code mapped to 1.
    pub one: String,
    /// Code mapped to 0.
    pub zero: String,
}

impl GenderMap {
    /// Map `one` to 1.0 and `zero` to 0.0.
    pub fn new(one: impl Into<String>, zero: impl Into<String>) -> Self {
        Self {
            one: one.into(),
            zero: zero.into(),
        }
    }

    fn encode(&self, code: &str) -> Option<f64> {
        if code == self.one {
            Some(1.0)
        } else if code == self.zero {
            Some(0.0)
        } else {
            None
        }
    }
}

impl Default for GenderMap {
    /// `"M"` → 1, `"F"` → 0.
    fn default() -> Self {
        Self::new("M", "F")
    }
}

/// Fixed category tables used to turn categorical columns into numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryMaps {
    /// Age bracket → representative age (bracket midpoint).
    pub age: BTreeMap<String, f64>,
    /// Gender code mapping.
    pub gender: GenderMap,
}

impl CategoryMaps {
    /// Add (or replace) an age bracket.
    pub fn with_age_bracket(mut self, bracket: impl Into<String>, value: f64) -> Self {
        self.age.insert(bracket.into(), value);
        self
    }

    /// Replace the gender mapping.
    pub fn with_gender(mut self, gender: GenderMap) -> Self {
        self.gender = gender;
        self
    }
}

impl Default for CategoryMaps {
    fn default() -> Self {
        let age = [("30-34", 32.0), ("35-39", 37.0), ("40-44", 42.0), ("45-49", 47.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            age,
            gender: GenderMap::default(),
        }
    }
}

fn required<T: Copy>(value: Option<T>, record: usize, column: &str) -> Result<T> {
    value.ok_or_else(|| Error::IncompleteRecord {
        record,
        column: column.to_string(),
    })
}

/// Encode raw records into an N × 8 matrix in original units.
///
/// Identifier columns are dropped. Column order is [`FEATURE_NAMES`].
pub fn encode(records: &[RawRecord], maps: &CategoryMaps) -> Result<Array2<f64>> {
    if records.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut out = Array2::zeros((records.len(), FEATURE_NAMES.len()));
    for (i, rec) in records.iter().enumerate() {
        let age = rec.age.as_deref().ok_or_else(|| Error::IncompleteRecord {
            record: i,
            column: "age".to_string(),
        })?;
        let age = *maps.age.get(age).ok_or_else(|| Error::UnknownCategory {
            column: "age",
            value: age.to_string(),
            record: i,
        })?;

        let gender = rec.gender.as_deref().ok_or_else(|| Error::IncompleteRecord {
            record: i,
            column: "gender".to_string(),
        })?;
        let gender = maps.gender.encode(gender).ok_or_else(|| Error::UnknownCategory {
            column: "gender",
            value: gender.to_string(),
            record: i,
        })?;

        let row = [
            age,
            gender,
            required(rec.interest, i, "interest")? as f64,
            required(rec.impressions, i, "impressions")? as f64,
            required(rec.clicks, i, "clicks")? as f64,
            required(rec.spent, i, "spent")?,
            required(rec.total_conversion, i, "total_conversion")? as f64,
            required(rec.approved_conversion, i, "approved_conversion")? as f64,
        ];
        out.row_mut(i).assign(&ArrayView1::from(&row[..]));
    }
    Ok(out)
}

/// Per-column mean and standard deviation, fitted once per dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    columns: Vec<String>,
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl Standardizer {
    /// Fit on `data`, naming columns `names` in error messages.
    ///
    /// Uses the population standard deviation. A constant column, or one whose
    /// σ is zero or not finite, yields [`Error::DegenerateFeature`]; a non-finite entry yields
    /// [`Error::IncompleteRecord`].
    pub fn fit(data: ArrayView2<'_, f64>, names: &[&str]) -> Result<Self> {
        let (n, d) = data.dim();
        if n == 0 || d == 0 {
            return Err(Error::EmptyInput);
        }
        if names.len() != d {
            return Err(Error::DimensionMismatch {
                expected: names.len(),
                found: d,
            });
        }

        for ((i, j), &x) in data.indexed_iter() {
            if !x.is_finite() {
                return Err(Error::IncompleteRecord {
                    record: i,
                    column: names[j].to_string(),
                });
            }
        }

        let mut mean = Array1::zeros(d);
        let mut std = Array1::zeros(d);
        for (j, col) in data.axis_iter(Axis(1)).enumerate() {
            let first = col[0];
            if col.iter().all(|&x| x == first) {
                return Err(Error::DegenerateFeature {
                    column: names[j].to_string(),
                    value: first,
                });
            }
            let mu = col.sum() / n as f64;
            let var = col.iter().map(|&x| (x - mu).powi(2)).sum::<f64>() / n as f64;
            let sigma = var.sqrt();
            // Distinct values can still underflow to σ = 0.
            if sigma == 0.0 || !sigma.is_finite() {
                return Err(Error::DegenerateFeature {
                    column: names[j].to_string(),
                    value: mu,
                });
            }
            mean[j] = mu;
            std[j] = sigma;
        }

        Ok(Self {
            columns: names.iter().map(|s| s.to_string()).collect(),
            mean,
            std,
        })
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Per-column means.
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Per-column standard deviations.
    pub fn std(&self) -> &Array1<f64> {
        &self.std
    }

    fn check_width(&self, found: usize) -> Result<()> {
        if found != self.mean.len() {
            return Err(Error::DimensionMismatch {
                expected: self.mean.len(),
                found,
            });
        }
        Ok(())
    }

    /// `(x - μ) / σ` for every row.
    pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        Ok((&data - &self.mean) / &self.std)
    }

    /// `z · σ + μ` for every row.
    pub fn inverse_transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.check_width(data.ncols())?;
        Ok(&data * &self.std + &self.mean)
    }

    /// Standardize a single vector.
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok((&row - &self.mean) / &self.std)
    }

    /// De-standardize a single vector.
    pub fn inverse_transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        self.check_width(row.len())?;
        Ok(&row * &self.std + &self.mean)
    }
}

/// Output of [`prepare`]: the encoded matrix, its standardized form and the
/// fitted parameters.
#[derive(Debug, Clone)]
pub struct PreparedFeatures {
    /// Encoded features in original units.
    pub raw: Array2<f64>,
    /// Standardized features.
    pub standardized: Array2<f64>,
    /// Parameters used for standardization.
    pub standardizer: Standardizer,
}

/// Encode, fit the standardizer and standardize in one step.
pub fn prepare(records: &[RawRecord], maps: &CategoryMaps) -> Result<PreparedFeatures> {
    let raw = encode(records, maps)?;
    let standardizer = Standardizer::fit(raw.view(), &FEATURE_NAMES)?;
    let standardized = standardizer.transform(raw.view())?;
    Ok(PreparedFeatures {
        raw,
        standardized,
        standardizer,
    })
}
