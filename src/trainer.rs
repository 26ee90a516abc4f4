use std::collections::HashMap;
use std::fmt;
use linfa::dataset::{AsTargets, Labels, Pr};
use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::LogisticRegression;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, ArrayView1, Axis, Ix1};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use crate::config::TrainingConfig;
use crate::error::PipelineError;
use crate::kmeans::LabeledRecord;

pub const FEATURE_NAMES: [&str; 4] = ["Recency", "Frequency", "Monetary", "AvgAmount"];
pub const CANDIDATES: [&str; 3] = ["logistic", "decision_tree", "random_forest"];

const LOGISTIC_ALPHAS: [f64; 4] = [0.01, 0.1, 1.0, 10.0];
const TREE_DEPTHS: [usize; 4] = [3, 5, 7, 10];
const FOREST_SIZES: [usize; 2] = [50, 100];
const FOREST_DEPTHS: [usize; 3] = [3, 5, 7];
const LOGISTIC_MAX_ITERATIONS: u64 = 200;
// Share of the training split used for fitting during the search; the rest scores it
const SEARCH_FIT_RATIO: f32 = 0.75;

type LabeledDataset = Dataset<f64, usize, Ix1>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hyperparameters {
    Logistic { alpha: f64 },
    DecisionTree { max_depth: usize },
    RandomForest { n_trees: usize, max_depth: usize },
}

impl Hyperparameters {
    pub fn model_name(&self) -> &'static str {
        match self {
            Hyperparameters::Logistic { .. } => "logistic",
            Hyperparameters::DecisionTree { .. } => "decision_tree",
            Hyperparameters::RandomForest { .. } => "random_forest",
        }
    }

    fn grid(model_name: &str) -> Vec<Hyperparameters> {
        match model_name {
            "logistic" => LOGISTIC_ALPHAS
                .iter()
                .map(|&alpha| Hyperparameters::Logistic { alpha })
                .collect(),
            "random_forest" => FOREST_SIZES
                .iter()
                .flat_map(|&n_trees| {
                    FOREST_DEPTHS
                        .iter()
                        .map(move |&max_depth| Hyperparameters::RandomForest { n_trees, max_depth })
                })
                .collect(),
            _ => TREE_DEPTHS
                .iter()
                .map(|&max_depth| Hyperparameters::DecisionTree { max_depth })
                .collect(),
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::Logistic { alpha } => write!(f, "alpha={alpha}"),
            Hyperparameters::DecisionTree { max_depth } => write!(f, "max_depth={max_depth}"),
            Hyperparameters::RandomForest { n_trees, max_depth } => {
                write!(f, "n_trees={n_trees},max_depth={max_depth}")
            }
        }
    }
}

// Outcome of tuning and evaluating one candidate model
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub params: Hyperparameters,
    pub val_auc: f32,
    pub test_auc: f32,
    pub test_f1: f32,
    pub test_accuracy: f32,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub candidates: Vec<CandidateReport>,
    pub best: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl TrainingReport {
    pub fn best(&self) -> &CandidateReport {
        &self.candidates[self.best]
    }
}

// Hard labels plus the high risk score customers are ranked by
#[derive(Debug, Clone)]
pub struct Predictions {
    pub labels: Array1<usize>,
    pub scores: Array1<Pr>,
}

/// High risk flags that always list the high risk class first, so linfa's
/// binary confusion matrix reports precision, recall and F1 for that class.
struct HighRiskFlags(Array1<bool>);

impl HighRiskFlags {
    fn new(labels: &Array1<usize>) -> Self {
        Self(labels.mapv(|label| label == 1))
    }
}

impl AsTargets for HighRiskFlags {
    type Elem = bool;
    type Ix = Ix1;

    fn as_targets(&self) -> ArrayView1<bool> {
        self.0.view()
    }
}

impl Labels for HighRiskFlags {
    type Elem = bool;

    fn label_count(&self) -> Vec<HashMap<bool, usize>> {
        self.0.label_count()
    }

    fn labels(&self) -> Vec<bool> {
        vec![true, false]
    }
}

fn to_dataset(records: &[LabeledRecord]) -> LabeledDataset {
    let mut features = Array2::zeros((records.len(), FEATURE_NAMES.len()));
    let mut targets = Array1::zeros(records.len());
    for (i, record) in records.iter().enumerate() {
        features[[i, 0]] = record.recency as f64;
        features[[i, 1]] = record.frequency as f64;
        features[[i, 2]] = record.monetary;
        features[[i, 3]] = record.avg_amount;
        targets[i] = usize::from(record.is_high_risk);
    }
    Dataset::new(features, targets).with_feature_names(FEATURE_NAMES.to_vec())
}

// Z-scores both splits with statistics taken from the training split only
fn standardize(
    train: LabeledDataset,
    test: LabeledDataset,
) -> Result<(LabeledDataset, LabeledDataset), PipelineError> {
    let mean = train
        .records()
        .mean_axis(Axis(0))
        .ok_or_else(|| PipelineError::Training("training split is empty".to_string()))?;
    let std = train
        .records()
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });

    let scale = |dataset: &LabeledDataset| {
        let records = (dataset.records() - &mean) / &std;
        Dataset::new(records, dataset.targets().to_owned())
    };
    Ok((scale(&train), scale(&test)))
}

fn to_probabilities(values: impl Iterator<Item = f64>) -> Result<Array1<Pr>, PipelineError> {
    values
        .map(|value| {
            Pr::try_from(value as f32)
                .map_err(|v| PipelineError::Training(format!("score {v} is not a probability")))
        })
        .collect()
}

/// Fits one grid point on `train` and scores `records`.
///
/// Logistic regression scores with its predicted probability of the high risk
/// class. A forest scores with the share of trees voting high risk. A single
/// tree only has hard labels, which double as its score.
pub fn fit_and_predict(
    params: Hyperparameters,
    train: &LabeledDataset,
    records: &Array2<f64>,
    seed: u64,
) -> Result<Predictions, PipelineError> {
    match params {
        Hyperparameters::Logistic { alpha } => {
            let model = LogisticRegression::default()
                .alpha(alpha)
                .max_iterations(LOGISTIC_MAX_ITERATIONS)
                .fit(train)
                .map_err(|e| PipelineError::Training(format!("logistic {params}: {e}")))?;
            // Probabilities are for the class linfa treats as positive, the majority class
            let high_risk_is_positive = model.labels().pos.class == 1;
            let probabilities = model.predict_probabilities(records);
            let scores = to_probabilities(probabilities.iter().map(|&p| {
                if high_risk_is_positive {
                    p
                } else {
                    1.0 - p
                }
            }))?;
            Ok(Predictions {
                labels: model.predict(records),
                scores,
            })
        }
        Hyperparameters::DecisionTree { max_depth } => {
            let model = DecisionTree::params()
                .max_depth(Some(max_depth))
                .fit(train)
                .map_err(|e| PipelineError::Training(format!("decision tree {params}: {e}")))?;
            let labels: Array1<usize> = model.predict(records);
            let scores = to_probabilities(labels.iter().map(|&label| label as f64))?;
            Ok(Predictions { labels, scores })
        }
        Hyperparameters::RandomForest { n_trees, max_depth } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut votes = Array1::<f64>::zeros(records.nrows());
            for sample in train.bootstrap_samples(train.records().nrows(), &mut rng).take(n_trees) {
                let tree = DecisionTree::params()
                    .max_depth(Some(max_depth))
                    .fit(&sample)
                    .map_err(|e| PipelineError::Training(format!("random forest {params}: {e}")))?;
                let predicted: Array1<usize> = tree.predict(records);
                votes += &predicted.mapv(|label| label as f64);
            }
            let share = votes / n_trees as f64;
            let labels = share.mapv(|s| usize::from(s >= 0.5));
            let scores = to_probabilities(share.iter().copied())?;
            Ok(Predictions { labels, scores })
        }
    }
}

/// ROC AUC of the high risk class through linfa's ROC curve. 0.5 when the
/// truth holds a single class and there is nothing to rank.
pub fn roc_auc(scores: &Array1<Pr>, truth: &Array1<usize>) -> Result<f32, PipelineError> {
    let truth: Vec<bool> = truth.iter().map(|&label| label == 1).collect();
    let positives = truth.iter().filter(|&&t| t).count();
    if positives == 0 || positives == truth.len() {
        return Ok(0.5);
    }
    // linfa's curve only gains its origin at the first score above zero; lifting
    // into [0.5, 1] keeps the ranking while hard 0/1 scores still start at the origin
    let lifted = scores.mapv(|score| Pr::new_unchecked(0.5 + 0.5 * *score));
    lifted
        .roc(truth.as_slice())
        .map(|roc| roc.area_under_curve())
        .map_err(|e| PipelineError::Training(e.to_string()))
}

/// F1 and accuracy of the high risk class from linfa's confusion matrix.
/// F1 is 0 when no customer is both predicted and truly high risk.
pub fn classification_scores(
    predicted: &Array1<usize>,
    truth: &Array1<usize>,
) -> Result<(f32, f32), PipelineError> {
    let cm = HighRiskFlags::new(predicted)
        .confusion_matrix(&truth.mapv(|label| label == 1))
        .map_err(|e| PipelineError::Training(e.to_string()))?;
    let f1 = cm.f1_score();
    Ok((if f1.is_nan() { 0.0 } else { f1 }, cm.accuracy()))
}

// Grid search on a split of the training data, then refit on all of it
fn tune_candidate(
    model_name: &str,
    train: &LabeledDataset,
    test: &LabeledDataset,
    seed: u64,
) -> Result<CandidateReport, PipelineError> {
    let (search_fit, search_val) = train.clone().split_with_ratio(SEARCH_FIT_RATIO);

    let mut best: Option<(Hyperparameters, f32)> = None;
    for params in Hyperparameters::grid(model_name) {
        let val_auc = fit_and_predict(params, &search_fit, search_val.records(), seed)
            .and_then(|predicted| roc_auc(&predicted.scores, search_val.targets()));
        match val_auc {
            Ok(val_auc) => {
                debug!(model = model_name, %params, val_auc, "Evaluated grid point");
                if best.map_or(true, |(_, auc)| val_auc > auc) {
                    best = Some((params, val_auc));
                }
            }
            Err(e) => warn!(model = model_name, %params, error = %e, "Skipping grid point"),
        }
    }

    let (params, val_auc) = best.ok_or_else(|| {
        PipelineError::Training(format!("no {model_name} grid point could be fitted"))
    })?;

    let predicted = fit_and_predict(params, train, test.records(), seed)?;
    let (test_f1, test_accuracy) = classification_scores(&predicted.labels, test.targets())?;
    Ok(CandidateReport {
        params,
        val_auc,
        test_auc: roc_auc(&predicted.scores, test.targets())?,
        test_f1,
        test_accuracy,
    })
}

/// Tunes every candidate model on the labeled customers and picks the one
/// with the highest held-out AUC.
pub fn train_models(
    records: &[LabeledRecord],
    config: &TrainingConfig,
) -> Result<TrainingReport, PipelineError> {
    let positives = records.iter().filter(|r| r.is_high_risk == 1).count();
    if positives == 0 || positives == records.len() {
        return Err(PipelineError::Training(format!(
            "both classes are required, got {positives} high risk out of {} customers",
            records.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.random_state);
    let (train, test) = to_dataset(records)
        .shuffle(&mut rng)
        .split_with_ratio(1.0 - config.test_size as f32);
    let (train, test) = standardize(train, test)?;
    info!(train = train.records().nrows(), test = test.records().nrows(), "Split labeled customers");

    let mut candidates = Vec::new();
    for model_name in CANDIDATES {
        match tune_candidate(model_name, &train, &test, config.random_state) {
            Ok(report) => {
                info!(
                    model = model_name,
                    params = %report.params,
                    test_auc = report.test_auc,
                    test_f1 = report.test_f1,
                    "Trained candidate"
                );
                candidates.push(report);
            }
            Err(e) => warn!(model = model_name, error = %e, "Candidate failed"),
        }
    }

    let best = candidates
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, candidate)| match best {
            Some((_, auc)) if auc >= candidate.test_auc => best,
            _ => Some((idx, candidate.test_auc)),
        })
        .map(|(idx, _)| idx)
        .ok_or_else(|| PipelineError::Training("no candidate model could be trained".to_string()))?;

    Ok(TrainingReport {
        best,
        train_rows: train.records().nrows(),
        test_rows: test.records().nrows(),
        candidates,
    })
}
