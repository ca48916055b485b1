//! Filesystem store for train/test evaluation artifacts.
//!
//! Artifacts live under `<root>/<model name>/<data size>/` and are addressed
//! by a fixed filename template keyed by operation, magnitude scale, chunk
//! name and split sizes:
//!
//! - `{opt}_true_{scale}_{chunk}_{train}_{test}.npy`
//! - `{opt}_pred_{scale}_{chunk}_{train}_{test}.npy`
//! - `{opt}_loss_{scale}_{chunk}_{train}_{test}.npy`
//! - `model_{scale}_{chunk}_{train}_{test}.pkl` (trained weights)

pub mod npy;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::model::{Operation, OptParams};

/// Paths of the artifact set for one (model, operation, params) combination
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub true_path: PathBuf,
    pub pred_path: PathBuf,
    pub loss_path: PathBuf,
    pub model_path: PathBuf,
}

/// One parsed record of a past train/test run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordEntry {
    pub train_ratio: String,
    pub data_size: String,
    pub sm_scale: String,
    pub chunk_name: String,
}

/// All records of one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_name: String,
    pub record: Vec<RecordEntry>,
}

/// Addressing and lifecycle of evaluation artifacts under a results root
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding all artifacts of a model at one data size
    pub fn result_dir(&self, model_name: &str, data_size: usize) -> PathBuf {
        self.root.join(model_name).join(data_size.to_string())
    }

    fn suffix(params: &OptParams) -> String {
        format!(
            "{}_{}_{}_{}",
            params.sm_scale,
            params.chunk_name,
            params.size_train(),
            params.size_test()
        )
    }

    /// Resolve the artifact paths for an operation
    pub fn paths(&self, model_name: &str, op: Operation, params: &OptParams) -> ArtifactPaths {
        let dir = self.result_dir(model_name, params.data_size);
        let suffix = Self::suffix(params);
        ArtifactPaths {
            true_path: dir.join(format!("{}_true_{}.npy", op.as_str(), suffix)),
            pred_path: dir.join(format!("{}_pred_{}.npy", op.as_str(), suffix)),
            loss_path: dir.join(format!("{}_loss_{}.npy", op.as_str(), suffix)),
            model_path: dir.join(format!("model_{}.pkl", suffix)),
        }
    }

    /// True iff every artifact the operation requires is present.
    ///
    /// Training runs additionally produce the weights file, so its presence is
    /// part of the train record; test records only cover the three arrays.
    pub fn record_exists(&self, model_name: &str, op: Operation, params: &OptParams) -> bool {
        let paths = self.paths(model_name, op, params);
        let arrays_exist = paths.true_path.exists()
            && paths.pred_path.exists()
            && paths.loss_path.exists();
        match op {
            Operation::Train => arrays_exist && paths.model_path.exists(),
            Operation::Test => arrays_exist,
        }
    }

    /// Delete the artifact set of an operation; NotFound when it is incomplete
    pub fn delete_record(
        &self,
        model_name: &str,
        op: Operation,
        params: &OptParams,
    ) -> io::Result<()> {
        if !self.record_exists(model_name, op, params) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {} record for model '{}'", op, model_name),
            ));
        }
        let paths = self.paths(model_name, op, params);
        fs::remove_file(&paths.true_path)?;
        fs::remove_file(&paths.pred_path)?;
        fs::remove_file(&paths.loss_path)?;
        if op == Operation::Train {
            fs::remove_file(&paths.model_path)?;
        }
        debug!("Deleted {} record for model '{}'", op, model_name);
        Ok(())
    }

    /// Scan the results tree for past runs of the given operation.
    ///
    /// Records are recovered from the filename template; files that do not
    /// parse are skipped.
    pub fn records(&self, model_names: &[String], op: Operation) -> Vec<ModelRecord> {
        let mut records = Vec::new();
        for model_name in model_names {
            let mut entries = Vec::new();
            let model_dir = self.root.join(model_name);
            for size_dir in read_dir_sorted(&model_dir) {
                if !size_dir.is_dir() {
                    continue;
                }
                let data_size = match dir_name_as_usize(&size_dir) {
                    Some(n) => n,
                    None => continue,
                };
                for file in read_dir_sorted(&size_dir) {
                    let name = match file.file_name().and_then(|n| n.to_str()) {
                        Some(n) => n,
                        None => continue,
                    };
                    if let Some(entry) = parse_record_name(name, op, data_size) {
                        entries.push(entry);
                    }
                }
            }
            records.push(ModelRecord {
                model_name: model_name.clone(),
                record: entries,
            });
        }
        records
    }
}

fn read_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    paths.sort();
    paths
}

fn dir_name_as_usize(path: &Path) -> Option<usize> {
    path.file_name()?.to_str()?.parse().ok()
}

/// Parse `{opt}_true_{scale}_{chunk}_{train}_{test}.npy` into a record entry;
/// only the `true` array of the matching operation counts as the record anchor
fn parse_record_name(file_name: &str, op: Operation, data_size: usize) -> Option<RecordEntry> {
    let stem = file_name.strip_suffix(".npy")?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() != 6 || parts[0] != op.as_str() || parts[1] != "true" {
        return None;
    }
    let size_train: usize = parts[4].parse().ok()?;
    parts[5].parse::<usize>().ok()?;
    if data_size == 0 {
        return None;
    }
    let ratio = (size_train as f64 / data_size as f64 * 100.0).round() / 100.0;
    Some(RecordEntry {
        train_ratio: format!("{}", ratio),
        data_size: data_size.to_string(),
        sm_scale: parts[2].to_string(),
        chunk_name: parts[3].to_string(),
    })
}
