//! Evaluation-result handlers: true-vs-pred comparison, loss curves and
//! artifact record management.

use actix_web::{web, HttpResponse};
use log::info;

use crate::artifacts::npy::read_npy;
use crate::core::error::ApiError;
use crate::core::model::{cal_metrics, Operation, OptParams};
use crate::web::models::{CompareResponse, Point, ResultQuery};
use crate::web::server::AppState;

/// Magnitude window shown in the comparison chart
const COMPARE_RANGE: (f64, f64) = (0.0, 3.5);
/// Point cap keeping chart payloads small
const MAX_COMPARE_POINTS: usize = 10000;

fn parse_op(raw: &str) -> Result<Operation, ApiError> {
    Operation::parse(raw)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown operation '{}', must be 'train' or 'test'", raw)))
}

/// `str(np.round(x, 4))`-style rendering of metric values; Python floats
/// always carry a decimal point (`-0.0`, `2.0`), so whole values get one too
fn round4(value: f64) -> String {
    let rounded = (value * 10000.0).round() / 10000.0;
    let mut text = format!("{}", rounded);
    if !text.contains('.') {
        text.push_str(".0");
    }
    text
}

/// Keep pairs where both values fall inside the window
fn remain_range(truth: &[f64], pred: &[f64], lo: f64, hi: f64) -> (Vec<f64>, Vec<f64>) {
    let mut t_out = Vec::new();
    let mut p_out = Vec::new();
    for (&t, &p) in truth.iter().zip(pred) {
        if t >= lo && t <= hi && p >= lo && p <= hi {
            t_out.push(t);
            p_out.push(p);
        }
    }
    (t_out, p_out)
}

/// Compare true and predicted magnitudes of a finished run
pub async fn compare_true_pred(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<ResultQuery>,
) -> Result<HttpResponse, ApiError> {
    let (name, opt) = path.into_inner();
    let op = parse_op(&opt)?;
    let params: OptParams = query.into_inner().into();
    params.validate()?;
    let paths = state.artifacts.paths(&name, op, &params);

    let truth = read_npy(&paths.true_path)?;
    let pred = read_npy(&paths.pred_path)?;
    let (truth, pred) = remain_range(&truth, &pred, COMPARE_RANGE.0, COMPARE_RANGE.1);

    let report = cal_metrics(&truth, &pred);
    let points = truth
        .iter()
        .zip(&pred)
        .take(MAX_COMPARE_POINTS)
        .map(|(&t, &p)| Point { x: t, y: p })
        .collect();

    Ok(HttpResponse::Ok().json(CompareResponse {
        points,
        r2: round4(report.r2),
        rmse: round4(report.rmse),
        e_mean: round4(report.e_mean),
        e_std: round4(report.e_std),
    }))
}

/// Per-epoch loss curve of a finished run
pub async fn loss_curve(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<ResultQuery>,
) -> Result<HttpResponse, ApiError> {
    let (name, opt) = path.into_inner();
    let op = parse_op(&opt)?;
    let params: OptParams = query.into_inner().into();
    params.validate()?;
    let paths = state.artifacts.paths(&name, op, &params);

    let loss = read_npy(&paths.loss_path)?;
    let points: Vec<Point> = loss
        .iter()
        .enumerate()
        .map(|(i, &v)| Point { x: i as f64, y: v })
        .collect();
    Ok(HttpResponse::Ok().json(points))
}

/// Whether the full artifact set of a run exists
pub async fn record_exists(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<ResultQuery>,
) -> Result<HttpResponse, ApiError> {
    let (name, opt) = path.into_inner();
    let op = parse_op(&opt)?;
    let params: OptParams = query.into_inner().into();
    params.validate()?;
    Ok(HttpResponse::Ok().json(state.artifacts.record_exists(&name, op, &params)))
}

/// Delete the artifact set of a run
pub async fn record_delete(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<ResultQuery>,
) -> Result<HttpResponse, ApiError> {
    let (name, opt) = path.into_inner();
    let op = parse_op(&opt)?;
    let params: OptParams = query.into_inner().into();
    params.validate()?;
    state.artifacts.delete_record(&name, op, &params)?;
    info!("Deleted {} record of model '{}'", op, name);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.93214999), "0.9321");
        assert_eq!(round4(0.5), "0.5");
        // Tiny negatives round to negative zero, rendered Python-style
        assert_eq!(round4(-0.00004), "-0.0");
        assert_eq!(round4(1.0), "1.0");
        assert_eq!(round4(2.00004), "2.0");
    }

    #[test]
    fn test_remain_range_drops_outliers() {
        let truth = [1.0, 2.0, 9.0, 3.0];
        let pred = [1.1, 8.0, 2.0, 2.9];
        let (t, p) = remain_range(&truth, &pred, 0.0, 3.5);
        assert_eq!(t, vec![1.0, 3.0]);
        assert_eq!(p, vec![1.1, 2.9]);
    }

    #[test]
    fn test_parse_op() {
        assert!(parse_op("train").is_ok());
        assert!(parse_op("test").is_ok());
        assert!(parse_op("validate").is_err());
    }
}
