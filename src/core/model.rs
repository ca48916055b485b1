use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::ModelError;

/// Per-model mutual-exclusion flag guarding the train/test slot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Situation {
    /// Slot is free, train or test may claim it
    Free,
    /// A training run holds the slot
    Training,
    /// A testing run holds the slot
    Testing,
}

impl Situation {
    /// Database representation; the literals match what the front-end expects
    pub fn as_str(&self) -> &'static str {
        match self {
            Situation::Free => "Free",
            Situation::Training => "training",
            Situation::Testing => "testing",
        }
    }

    pub fn parse(s: &str) -> Option<Situation> {
        match s {
            "Free" => Some(Situation::Free),
            "training" => Some(Situation::Training),
            "testing" => Some(Situation::Testing),
            _ => None,
        }
    }
}

impl Display for Situation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Train or test, used both for dispatch and in artifact filenames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Train,
    Test,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Train => "train",
            Operation::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Operation> {
        match s {
            "train" => Some(Operation::Train),
            "test" => Some(Operation::Test),
            _ => None,
        }
    }

    /// The situation a successful claim moves the slot into
    pub fn situation(&self) -> Situation {
        match self {
            Operation::Train => Situation::Training,
            Operation::Test => Situation::Testing,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parameters of a train/test run, shared with the result-query endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptParams {
    /// Magnitude-scale selector (e.g. "ml", "md")
    pub sm_scale: String,
    /// Named partition of the source dataset
    pub chunk_name: String,
    /// Total number of samples drawn from the chunk
    pub data_size: usize,
    /// Fraction of `data_size` used for training
    pub train_ratio: f64,
    /// Optional epoch-count override
    pub epochs: Option<usize>,
    /// Optional learning-rate override
    pub learning_rate: Option<f64>,
}

impl OptParams {
    /// Reject split parameters that cannot produce a valid train/test split
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.data_size == 0 {
            return Err(ModelError::Data("data_size must be positive".to_string()));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio <= 1.0) {
            return Err(ModelError::Data(format!(
                "train_ratio must be in (0, 1], got {}",
                self.train_ratio
            )));
        }
        Ok(())
    }

    /// Training-split size, `floor(data_size * train_ratio)`, never larger
    /// than the chunk itself
    pub fn size_train(&self) -> usize {
        ((self.data_size as f64 * self.train_ratio) as usize).min(self.data_size)
    }

    /// Testing-split size, the remainder of the chunk
    pub fn size_test(&self) -> usize {
        self.data_size - self.size_train()
    }
}

/// Evaluation metrics returned by train/test runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub r2: f64,
    pub rmse: f64,
    pub e_mean: f64,
    pub e_std: f64,
}

/// Compute r2, rmse, mean error and error standard deviation
pub fn cal_metrics(truth: &[f64], pred: &[f64]) -> EvalReport {
    let n = truth.len().min(pred.len());
    if n == 0 {
        return EvalReport {
            r2: 0.0,
            rmse: 0.0,
            e_mean: 0.0,
            e_std: 0.0,
        };
    }

    let mean_true = truth[..n].iter().sum::<f64>() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut e_sum = 0.0;
    for i in 0..n {
        let e = pred[i] - truth[i];
        ss_res += e * e;
        ss_tot += (truth[i] - mean_true) * (truth[i] - mean_true);
        e_sum += e;
    }

    let e_mean = e_sum / n as f64;
    let mut e_var = 0.0;
    for i in 0..n {
        let d = (pred[i] - truth[i]) - e_mean;
        e_var += d * d;
    }
    e_var /= n as f64;

    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    EvalReport {
        r2,
        rmse: (ss_res / n as f64).sqrt(),
        e_mean,
        e_std: e_var.sqrt(),
    }
}

/// Core trait for live trainable/testable model objects held in the registry
#[async_trait]
pub trait SeismicModel: Send + Sync + Debug {
    /// Model name as stored in `dl_models`
    fn name(&self) -> &str;

    /// Run a training job and write its artifacts
    async fn training(&self, params: &OptParams) -> Result<EvalReport, ModelError>;

    /// Evaluate previously trained weights and write test artifacts
    async fn testing(&self, params: &OptParams) -> Result<EvalReport, ModelError>;
}
