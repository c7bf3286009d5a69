//! Grid reconciliation: one message to flat (lat, lon, value) points.

use std::fmt;

use crate::message::{keys, GribMessage, GridData, GridError};

/// One grid point. `value` is `None` when masked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    pub value: Option<f64>,
}

impl Point {
    /// The value, unless masked or NaN.
    pub fn unmasked_value(&self) -> Option<f64> {
        self.value.filter(|v| !v.is_nan())
    }
}

/// Three equal-length sequences describing the points of one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Points {
    lats: Vec<f64>,
    lons: Vec<f64>,
    values: Vec<Option<f64>>,
}

impl Points {
    fn new(lats: Vec<f64>, lons: Vec<f64>, values: Vec<Option<f64>>) -> Self {
        debug_assert!(lats.len() == lons.len() && lons.len() == values.len());
        Self { lats, lons, values }
    }

    fn single(lat: f64, lon: f64, value: Option<f64>) -> Self {
        Self::new(vec![lat], vec![lon], vec![value])
    }

    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    pub fn lons(&self) -> &[f64] {
        &self.lons
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        Some(Point {
            lat: *self.lats.get(index)?,
            lon: *self.lons.get(index)?,
            value: *self.values.get(index)?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Why a message produced no points.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Grid extraction failed and the scalar attributes are incomplete.
    NoGrid(GridError),
    /// Grid extraction succeeded with zero points.
    EmptyGrid,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoGrid(e) => write!(f, "no usable grid ({})", e),
            SkipReason::EmptyGrid => f.write_str("grid has no points"),
        }
    }
}

/// Result of reconciling one message.
#[derive(Debug, Clone, PartialEq)]
pub enum GridOutcome {
    Grid(Points),
    Skipped(SkipReason),
}

impl GridOutcome {
    /// The points, empty when the message was skipped.
    pub fn into_points(self) -> Points {
        match self {
            GridOutcome::Grid(points) => points,
            GridOutcome::Skipped(_) => Points::default(),
        }
    }
}

/// Turns a message's grid into flat point sequences.
pub struct GridReconciler;

impl GridReconciler {
    /// Reconcile one message.
    ///
    /// The native grid is tried first. When it fails, or is internally
    /// inconsistent, the scalar `latitude`, `longitude` and `value` (or
    /// `data`) attributes are used instead. Masked values are kept.
    pub fn reconcile(message: &impl GribMessage) -> GridOutcome {
        let error = match message.grid().and_then(flatten) {
            Ok(points) if points.is_empty() => return GridOutcome::Skipped(SkipReason::EmptyGrid),
            Ok(points) => return GridOutcome::Grid(points),
            Err(e) => e,
        };

        match scalar_attributes(message) {
            Some(points) => GridOutcome::Grid(points),
            None => GridOutcome::Skipped(SkipReason::NoGrid(error)),
        }
    }
}

fn flatten(grid: GridData) -> Result<Points, GridError> {
    match grid {
        GridData::Field {
            lats,
            lons,
            values,
            shape: (rows, columns),
        } => {
            let expected = rows * columns;
            if lats.len() != expected || lons.len() != expected || values.len() != expected {
                return Err(GridError::Inconsistent(format!(
                    "{}x{} grid with {} latitudes, {} longitudes and {} values",
                    rows,
                    columns,
                    lats.len(),
                    lons.len(),
                    values.len()
                )));
            }
            Ok(Points::new(lats, lons, values))
        }
        GridData::Scalar { lats, lons, value } => match (lats.first(), lons.first()) {
            (Some(lat), Some(lon)) => Ok(Points::single(*lat, *lon, value)),
            _ => Err(GridError::Inconsistent(
                "Scalar grid without coordinates".to_string(),
            )),
        },
    }
}

fn scalar_attributes(message: &impl GribMessage) -> Option<Points> {
    let lat = message.attribute(keys::LATITUDE)?.as_f64()?;
    let lon = message.attribute(keys::LONGITUDE)?.as_f64()?;
    let value = message
        .attribute(keys::VALUE)
        .or_else(|| message.attribute(keys::DATA))?
        .as_f64()?;
    Some(Points::single(lat, lon, Some(value)))
}
