//! Chunk dataset access.
//!
//! A chunk is a named partition of the source dataset stored as
//! `<root>/<chunk>/<chunk>.csv` with one metadata row per waveform. The
//! loader builds ndarray matrices for the trainers and serves the feature
//! distribution and geolocation queries.

use std::error::Error;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

use crate::core::error::{ApiError, ModelError};

/// Feature columns fed to the magnitude estimators
pub const FEATURE_COLUMNS: [&str; 5] = [
    "p_arrival_sample",
    "s_arrival_sample",
    "source_depth_km",
    "source_distance_km",
    "snr_db",
];

/// Target column predicted by the estimators
pub const TARGET_COLUMN: &str = "source_magnitude";

/// Column carrying the magnitude-scale tag, when the chunk provides one
pub const SCALE_COLUMN: &str = "source_magnitude_type";

/// Feature descriptors seeded into the store: (name, label, unit, description)
pub const FEATURE_CATALOG: [(&str, &str, Option<&str>, &str); 8] = [
    (
        "source_magnitude",
        "Magnitude",
        None,
        "Magnitude of the earthquake source",
    ),
    (
        "source_depth_km",
        "Source depth",
        Some("km"),
        "Depth of the earthquake source",
    ),
    (
        "source_distance_km",
        "Source distance",
        Some("km"),
        "Epicentral distance between source and station",
    ),
    ("snr_db", "SNR", Some("dB"), "Signal-to-noise ratio of the trace"),
    (
        "p_arrival_sample",
        "P arrival",
        Some("sample"),
        "Sample index of the P-wave arrival",
    ),
    (
        "s_arrival_sample",
        "S arrival",
        Some("sample"),
        "Sample index of the S-wave arrival",
    ),
    (
        "source_latitude",
        "Latitude",
        Some("deg"),
        "Latitude of the earthquake source",
    ),
    (
        "source_longitude",
        "Longitude",
        Some("deg"),
        "Longitude of the earthquake source",
    ),
];

#[derive(Debug)]
pub enum DataError {
    Io(io::Error),
    Csv(csv::Error),
    MissingColumn(String),
    Insufficient { have: usize, want: usize },
}

impl Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::Io(e) => write!(f, "io error: {}", e),
            DataError::Csv(e) => write!(f, "csv error: {}", e),
            DataError::MissingColumn(name) => write!(f, "missing column '{}'", name),
            DataError::Insufficient { have, want } => {
                write!(f, "chunk has {} usable rows, requested {}", have, want)
            }
        }
    }
}

impl Error for DataError {}

impl From<io::Error> for DataError {
    fn from(err: io::Error) -> Self {
        DataError::Io(err)
    }
}

impl From<csv::Error> for DataError {
    fn from(err: csv::Error) -> Self {
        DataError::Csv(err)
    }
}

impl From<DataError> for ModelError {
    fn from(err: DataError) -> Self {
        ModelError::Data(format!("{}", err))
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                ApiError::NotFound(format!("{}", e))
            }
            DataError::Io(e) => ApiError::Internal(format!("io error: {}", e)),
            DataError::Csv(e) => ApiError::Internal(format!("csv error: {}", e)),
            other => ApiError::BadRequest(format!("{}", other)),
        }
    }
}

/// Feature matrix and magnitude targets for a slice of a chunk
#[derive(Debug, Clone)]
pub struct ChunkDataset {
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
}

/// An earthquake source for the geolocation query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePoint {
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Magnitude")]
    pub magnitude: f64,
}

/// Reads chunk CSV files under a data root
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    root: PathBuf,
}

impl DatasetLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path of the metadata CSV of a chunk
    pub fn chunk_path(&self, chunk_name: &str) -> PathBuf {
        self.root
            .join(chunk_name)
            .join(format!("{}.csv", chunk_name))
    }

    fn reader(&self, chunk_name: &str) -> Result<csv::Reader<std::fs::File>, DataError> {
        let path = self.chunk_path(chunk_name);
        let file = std::fs::File::open(&path).map_err(|e| {
            DataError::Io(io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        Ok(csv::Reader::from_reader(file))
    }

    fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize, DataError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Load the first `data_size` usable rows of a chunk as a feature matrix.
    ///
    /// Rows with non-numeric feature or target values are skipped. When the
    /// chunk carries a scale column, only rows tagged with `sm_scale` count.
    pub fn load_matrix(
        &self,
        chunk_name: &str,
        sm_scale: &str,
        data_size: usize,
    ) -> Result<ChunkDataset, DataError> {
        let mut reader = self.reader(chunk_name)?;
        let headers = reader.headers()?.clone();
        let feature_idx: Vec<usize> = FEATURE_COLUMNS
            .iter()
            .map(|name| Self::column_index(&headers, name))
            .collect::<Result<_, _>>()?;
        let target_idx = Self::column_index(&headers, TARGET_COLUMN)?;
        let scale_idx = headers.iter().position(|h| h == SCALE_COLUMN);

        let mut rows: Vec<[f64; FEATURE_COLUMNS.len()]> = Vec::with_capacity(data_size);
        let mut targets: Vec<f64> = Vec::with_capacity(data_size);
        for record in reader.records() {
            if rows.len() == data_size {
                break;
            }
            let record = record?;
            if let Some(idx) = scale_idx {
                match record.get(idx) {
                    Some(tag) if tag.eq_ignore_ascii_case(sm_scale) => {}
                    _ => continue,
                }
            }
            let target = match record.get(target_idx).and_then(|v| v.parse::<f64>().ok()) {
                Some(v) => v,
                None => continue,
            };
            let mut row = [0.0; FEATURE_COLUMNS.len()];
            let mut valid = true;
            for (slot, &idx) in row.iter_mut().zip(&feature_idx) {
                match record.get(idx).and_then(|v| v.parse::<f64>().ok()) {
                    Some(v) => *slot = v,
                    None => {
                        valid = false;
                        break;
                    }
                }
            }
            if !valid {
                continue;
            }
            rows.push(row);
            targets.push(target);
        }

        if rows.len() < data_size {
            return Err(DataError::Insufficient {
                have: rows.len(),
                want: data_size,
            });
        }

        let mut features = Array2::zeros((rows.len(), FEATURE_COLUMNS.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                features[[i, j]] = *value;
            }
        }
        Ok(ChunkDataset {
            features,
            targets: Array1::from(targets),
        })
    }

    /// Values of one column over the first `data_size` usable rows
    pub fn load_column(
        &self,
        chunk_name: &str,
        column: &str,
        data_size: usize,
    ) -> Result<Vec<f64>, DataError> {
        let mut reader = self.reader(chunk_name)?;
        let headers = reader.headers()?.clone();
        let idx = Self::column_index(&headers, column)?;

        let mut values = Vec::with_capacity(data_size);
        for record in reader.records() {
            if values.len() == data_size {
                break;
            }
            let record = record?;
            if let Some(v) = record.get(idx).and_then(|v| v.parse::<f64>().ok()) {
                values.push(v);
            }
        }
        Ok(values)
    }

    /// Sources inside a longitude/latitude box, down-sampled to `max_points`
    pub fn locate(
        &self,
        chunk_name: &str,
        lo_min: f64,
        lo_max: f64,
        la_min: f64,
        la_max: f64,
        max_points: usize,
    ) -> Result<Vec<SourcePoint>, DataError> {
        let mut reader = self.reader(chunk_name)?;
        let headers = reader.headers()?.clone();
        let la_idx = Self::column_index(&headers, "source_latitude")?;
        let lo_idx = Self::column_index(&headers, "source_longitude")?;
        let sm_idx = Self::column_index(&headers, TARGET_COLUMN)?;

        let mut points = Vec::new();
        for record in reader.records() {
            let record = record?;
            let parse = |idx: usize| record.get(idx).and_then(|v| v.parse::<f64>().ok());
            let (la, lo, sm) = match (parse(la_idx), parse(lo_idx), parse(sm_idx)) {
                (Some(la), Some(lo), Some(sm)) => (la, lo, sm),
                _ => continue,
            };
            if la >= la_min && la <= la_max && lo >= lo_min && lo <= lo_max {
                points.push(SourcePoint {
                    longitude: lo,
                    latitude: la,
                    magnitude: sm,
                });
            }
        }

        if points.len() <= max_points {
            return Ok(points);
        }
        let mut rng = rand::thread_rng();
        let picked = sample(&mut rng, points.len(), max_points);
        Ok(picked.into_iter().map(|i| points[i].clone()).collect())
    }
}

/// Histogram point for the distribution endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistPoint {
    pub x: f64,
    pub y: f64,
}

/// Histogram of `values` over `bins` equal-width bins.
///
/// `v_min`/`v_max` clamp the range when given; values outside it are dropped.
/// X coordinates are the bin centers.
pub fn histogram(
    values: &[f64],
    bins: usize,
    v_min: Option<f64>,
    v_max: Option<f64>,
) -> Vec<DistPoint> {
    if bins == 0 || values.is_empty() {
        return Vec::new();
    }
    let data_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let data_max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let lo = v_min.unwrap_or(data_min);
    let hi = v_max.unwrap_or(data_max);
    if !lo.is_finite() || !hi.is_finite() || hi < lo {
        return Vec::new();
    }

    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };
    let mut counts = vec![0u64; bins];
    for &v in values {
        if v < lo || v > hi {
            continue;
        }
        let mut idx = ((v - lo) / width) as usize;
        if idx >= bins {
            idx = bins - 1; // v == hi lands in the last bin
        }
        counts[idx] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| DistPoint {
            x: lo + (i as f64 + 0.5) * width,
            y: count as f64,
        })
        .collect()
}
