//! Gradient-descent magnitude estimator backing the built-in models.
//!
//! Each built-in model wraps the same regression core with its own
//! hyperparameters. Training standardizes the feature columns, runs plain
//! batch gradient descent on a linear model, records the per-epoch loss, and
//! writes the full artifact set; testing reloads the saved weights and
//! evaluates the held-out split.

use std::fs;

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::artifacts::npy::{read_npy, write_npy};
use crate::artifacts::ArtifactStore;
use crate::core::error::ModelError;
use crate::core::model::{cal_metrics, EvalReport, Operation, OptParams, SeismicModel};
use crate::data::DatasetLoader;
use crate::store::ModelStore;

/// Tunables of one built-in estimator
#[derive(Debug, Clone, Copy)]
pub struct Hyperparams {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Ridge penalty on the weight vector
    pub l2: f64,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.05,
            l2: 1e-4,
        }
    }
}

/// Serialized trained state, written to the `.pkl`-named weights file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrainedWeights {
    model: String,
    weights: Vec<f64>,
    bias: f64,
    feature_mean: Vec<f64>,
    feature_std: Vec<f64>,
    trained_at: String,
}

/// A live, trainable magnitude-estimation model
#[derive(Debug, Clone)]
pub struct MagEstimator {
    name: String,
    hyper: Hyperparams,
    store: ModelStore,
    artifacts: ArtifactStore,
    loader: DatasetLoader,
}

impl MagEstimator {
    pub fn new(
        name: &str,
        hyper: Hyperparams,
        store: ModelStore,
        artifacts: ArtifactStore,
        loader: DatasetLoader,
    ) -> Self {
        Self {
            name: name.to_string(),
            hyper,
            store,
            artifacts,
            loader,
        }
    }

    /// Best-effort progress line; training never fails on a logging hiccup
    fn progress(&self, line: &str) {
        if let Err(e) = self.store.append_process(&self.name, line) {
            warn!("{}: could not record progress: {}", self.name, e);
        }
    }

    fn standardize(features: &ArrayView2<f64>) -> (Array1<f64>, Array1<f64>) {
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features.ncols()));
        let mut std = Array1::zeros(features.ncols());
        for j in 0..features.ncols() {
            let col = features.column(j);
            let m = mean[j];
            let var = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / col.len().max(1) as f64;
            std[j] = if var.sqrt() > 1e-12 { var.sqrt() } else { 1.0 };
        }
        (mean, std)
    }

    fn apply_standardize(
        features: &ArrayView2<f64>,
        mean: &Array1<f64>,
        std: &Array1<f64>,
    ) -> Array2<f64> {
        let mut out = features.to_owned();
        for j in 0..out.ncols() {
            let mut col = out.column_mut(j);
            col.mapv_inplace(|v| (v - mean[j]) / std[j]);
        }
        out
    }

    fn train_blocking(&self, params: &OptParams) -> Result<EvalReport, ModelError> {
        let size_train = params.size_train();
        if size_train == 0 {
            return Err(ModelError::Data(
                "training split is empty, increase data_size or train_ratio".to_string(),
            ));
        }
        let epochs = params.epochs.unwrap_or(self.hyper.epochs).max(1);
        let lr = params.learning_rate.unwrap_or(self.hyper.learning_rate);

        self.progress(&format!(
            "loading chunk '{}' ({} samples, scale {})",
            params.chunk_name, params.data_size, params.sm_scale
        ));
        let dataset =
            self.loader
                .load_matrix(&params.chunk_name, &params.sm_scale, params.data_size)?;

        let x_train = dataset.features.slice(s![..size_train, ..]);
        let y_train = dataset.targets.slice(s![..size_train]);
        let (mean, std) = Self::standardize(&x_train);
        let x = Self::apply_standardize(&x_train, &mean, &std);

        let n = size_train as f64;
        let mut w: Array1<f64> = Array1::zeros(x.ncols());
        let mut b = y_train.sum() / n;
        let mut losses = Vec::with_capacity(epochs);
        let report_every = (epochs / 10).max(1);

        self.progress(&format!("training: {} epochs, lr {}", epochs, lr));
        for epoch in 0..epochs {
            let pred = x.dot(&w) + b;
            let err = &pred - &y_train;
            let loss = err.iter().map(|e| e * e).sum::<f64>() / n;
            losses.push(loss);

            let grad_w = x.t().dot(&err) * (2.0 / n) + &w * self.hyper.l2;
            let grad_b = 2.0 * err.sum() / n;
            w = w - grad_w * lr;
            b -= grad_b * lr;

            if (epoch + 1) % report_every == 0 {
                self.progress(&format!("epoch {}/{} loss {:.6}", epoch + 1, epochs, loss));
            }
        }

        let pred = x.dot(&w) + b;
        let truth: Vec<f64> = y_train.to_vec();
        let predictions: Vec<f64> = pred.to_vec();

        let paths = self.artifacts.paths(&self.name, Operation::Train, params);
        if let Some(dir) = paths.true_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ModelError::Artifact(format!("create result dir: {}", e)))?;
        }
        write_npy(&paths.true_path, &truth)
            .map_err(|e| ModelError::Artifact(format!("write true array: {}", e)))?;
        write_npy(&paths.pred_path, &predictions)
            .map_err(|e| ModelError::Artifact(format!("write pred array: {}", e)))?;
        write_npy(&paths.loss_path, &losses)
            .map_err(|e| ModelError::Artifact(format!("write loss array: {}", e)))?;

        let trained = TrainedWeights {
            model: self.name.clone(),
            weights: w.to_vec(),
            bias: b,
            feature_mean: mean.to_vec(),
            feature_std: std.to_vec(),
            trained_at: Utc::now().to_rfc3339(),
        };
        let encoded = serde_json::to_vec(&trained)
            .map_err(|e| ModelError::Artifact(format!("encode weights: {}", e)))?;
        fs::write(&paths.model_path, encoded)
            .map_err(|e| ModelError::Artifact(format!("write weights: {}", e)))?;

        let report = cal_metrics(&truth, &predictions);
        self.progress(&format!(
            "training done: r2 {:.4} rmse {:.4}",
            report.r2, report.rmse
        ));
        Ok(report)
    }

    fn test_blocking(&self, params: &OptParams) -> Result<EvalReport, ModelError> {
        let paths = self.artifacts.paths(&self.name, Operation::Test, params);
        let weights_path = self
            .artifacts
            .paths(&self.name, Operation::Train, params)
            .model_path;
        if !weights_path.exists() {
            return Err(ModelError::ArtifactMissing(format!(
                "no trained weights at {}",
                weights_path.display()
            )));
        }
        let raw = fs::read(&weights_path)
            .map_err(|e| ModelError::Artifact(format!("read weights: {}", e)))?;
        let trained: TrainedWeights = serde_json::from_slice(&raw)
            .map_err(|e| ModelError::Artifact(format!("decode weights: {}", e)))?;

        self.progress(&format!(
            "testing on chunk '{}' ({} held-out samples)",
            params.chunk_name,
            params.size_test()
        ));
        let dataset =
            self.loader
                .load_matrix(&params.chunk_name, &params.sm_scale, params.data_size)?;
        let size_train = params.size_train();
        let x_test = dataset.features.slice(s![size_train.., ..]);
        let y_test = dataset.targets.slice(s![size_train..]);

        let mean = Array1::from(trained.feature_mean.clone());
        let std = Array1::from(trained.feature_std.clone());
        let w = Array1::from(trained.weights.clone());
        let x = Self::apply_standardize(&x_test, &mean, &std);
        let pred = x.dot(&w) + trained.bias;

        let truth: Vec<f64> = y_test.to_vec();
        let predictions: Vec<f64> = pred.to_vec();
        // Per-sample squared error stands in for a loss curve on the test side
        let losses: Vec<f64> = truth
            .iter()
            .zip(&predictions)
            .map(|(t, p)| (p - t) * (p - t))
            .collect();

        if let Some(dir) = paths.true_path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| ModelError::Artifact(format!("create result dir: {}", e)))?;
        }
        write_npy(&paths.true_path, &truth)
            .map_err(|e| ModelError::Artifact(format!("write true array: {}", e)))?;
        write_npy(&paths.pred_path, &predictions)
            .map_err(|e| ModelError::Artifact(format!("write pred array: {}", e)))?;
        write_npy(&paths.loss_path, &losses)
            .map_err(|e| ModelError::Artifact(format!("write loss array: {}", e)))?;

        let report = cal_metrics(&truth, &predictions);
        self.progress(&format!(
            "testing done: r2 {:.4} rmse {:.4}",
            report.r2, report.rmse
        ));
        Ok(report)
    }
}

#[async_trait]
impl SeismicModel for MagEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn training(&self, params: &OptParams) -> Result<EvalReport, ModelError> {
        let this = self.clone();
        let params = params.clone();
        tokio::task::spawn_blocking(move || this.train_blocking(&params))
            .await
            .map_err(|e| ModelError::Status(format!("training task failed: {}", e)))?
    }

    async fn testing(&self, params: &OptParams) -> Result<EvalReport, ModelError> {
        let this = self.clone();
        let params = params.clone();
        tokio::task::spawn_blocking(move || this.test_blocking(&params))
            .await
            .map_err(|e| ModelError::Status(format!("testing task failed: {}", e)))?
    }
}
