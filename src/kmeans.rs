use ndarray::{Array2, ArrayView1};
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};
use crate::config::RiskConfig;
use crate::error::PipelineError;
use crate::pipeline::Stage;
use crate::rfm::RfmRecord;

const MAX_ITERATIONS: u64 = 300;
const TOLERANCE: f64 = 1e-4;
const N_RUNS: usize = 10;

// RFM record plus the binary label derived from cluster membership
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledRecord {
    #[serde(rename = "CustomerId")]
    pub customer_id: String,
    #[serde(rename = "Recency")]
    pub recency: i64,
    #[serde(rename = "Frequency")]
    pub frequency: usize,
    #[serde(rename = "Monetary")]
    pub monetary: f64,
    #[serde(rename = "AvgAmount")]
    pub avg_amount: f64,
    pub is_high_risk: u8,
}

/// Fitted state of the risk labeler. Produced by `fit`, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskModel {
    centroids: Array2<f64>,
    risk_cluster: usize,
}

impl RiskModel {
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn risk_cluster(&self) -> usize {
        self.risk_cluster
    }

    /// Id of the nearest centroid; ties go to the lower id.
    pub fn assign(&self, record: &RfmRecord) -> usize {
        let features = record.clustering_features();
        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = squared_distance(&features, centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        closest_cluster
    }

    pub fn cluster_sizes(&self, records: &[RfmRecord]) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.nrows()];
        for record in records {
            sizes[self.assign(record)] += 1;
        }
        sizes
    }

    pub fn label(&self, records: &[RfmRecord]) -> Vec<LabeledRecord> {
        records
            .iter()
            .map(|record| LabeledRecord {
                customer_id: record.customer_id.clone(),
                recency: record.recency,
                frequency: record.frequency,
                monetary: record.monetary,
                avg_amount: record.avg_amount,
                is_high_risk: u8::from(self.assign(record) == self.risk_cluster),
            })
            .collect()
    }
}

fn squared_distance(features: &[f64; 3], centroid: ArrayView1<f64>) -> f64 {
    features
        .iter()
        .zip(centroid.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

// Clusters customers on Recency, Frequency and Monetary and flags the configured cluster
#[derive(Debug, Clone)]
pub struct RiskLabelGenerator {
    n_clusters: usize,
    risk_cluster: usize,
    random_state: u64,
    fitted: Option<RiskModel>,
}

impl RiskLabelGenerator {
    pub fn new(n_clusters: usize, risk_cluster: usize, random_state: u64) -> Self {
        Self {
            n_clusters,
            risk_cluster,
            random_state,
            fitted: None,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.n_clusters, config.risk_cluster, config.random_state)
    }

    pub fn model(&self) -> Option<&RiskModel> {
        self.fitted.as_ref()
    }

    fn fit_model(&self, records: &[RfmRecord]) -> Result<RiskModel, PipelineError> {
        let n_samples = records.len();
        if n_samples < self.n_clusters {
            return Err(PipelineError::InsufficientSamples {
                stage: Self::NAME,
                samples: n_samples,
                clusters: self.n_clusters,
            });
        }

        // Convert to ndarray, one column per feature the stage reads
        let mut data = Array2::zeros((n_samples, Self::REQUIRED_COLUMNS.len()));
        for (i, record) in records.iter().enumerate() {
            for (j, &value) in record.clustering_features().iter().enumerate() {
                data[[i, j]] = value;
            }
        }
        let dataset = DatasetBase::from(data);

        let rng = StdRng::seed_from_u64(self.random_state);
        let model = KMeans::params_with(self.n_clusters, rng, L2Dist)
            .n_runs(N_RUNS)
            .max_n_iterations(MAX_ITERATIONS)
            .tolerance(TOLERANCE)
            .fit(&dataset)
            .map_err(|e| PipelineError::Clustering(e.to_string()))?;

        Ok(RiskModel {
            centroids: model.centroids().clone(),
            risk_cluster: self.risk_cluster,
        })
    }
}

impl Stage for RiskLabelGenerator {
    type Input = RfmRecord;
    type Output = LabeledRecord;

    const NAME: &'static str = "risk_labeler";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["Recency", "Frequency", "Monetary"];

    // Refits from scratch; a failed fit leaves the stage unfitted
    fn fit(&mut self, records: &[RfmRecord]) -> Result<(), PipelineError> {
        self.fitted = None;
        let model = self.fit_model(records)?;
        debug!(
            features = ?Self::REQUIRED_COLUMNS,
            centroids = ?model.centroids(),
            "Fitted k-means centroids"
        );
        info!(
            customers = records.len(),
            clusters = self.n_clusters,
            sizes = ?model.cluster_sizes(records),
            "Fitted risk clusters"
        );
        self.fitted = Some(model);
        Ok(())
    }

    fn transform(&self, records: &[RfmRecord]) -> Result<Vec<LabeledRecord>, PipelineError> {
        let model = self
            .fitted
            .as_ref()
            .ok_or(PipelineError::NotFitted { stage: Self::NAME })?;

        let labeled = model.label(records);
        let high_risk = labeled.iter().filter(|r| r.is_high_risk == 1).count();
        info!(customers = labeled.len(), high_risk, "Labeled customers");
        Ok(labeled)
    }
}
