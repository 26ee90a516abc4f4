use std::collections::BTreeMap;
use chrono::NaiveDateTime;
use tracing::{debug, info};
use crate::cleaner::CleanTransaction;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::pipeline::Stage;
use crate::timestamp::{Timestamp, TimestampKind};

const TIME_COLUMN: &str = "TransactionStartTime";

// Per-customer behavioral aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
    pub avg_amount: f64,
}

impl RfmRecord {
    // The clustering features, AvgAmount excluded
    pub fn clustering_features(&self) -> [f64; 3] {
        [self.recency as f64, self.frequency as f64, self.monetary]
    }
}

struct CustomerTotals {
    latest: NaiveDateTime,
    count: usize,
    total: f64,
}

/// Aggregates cleaned transactions into one [`RfmRecord`] per customer,
/// measuring Recency against a snapshot fixed at construction.
#[derive(Debug, Clone)]
pub struct RfmTransformer {
    snapshot: Timestamp,
}

impl RfmTransformer {
    pub fn new(snapshot_date: &str) -> Result<Self, PipelineError> {
        let snapshot = Timestamp::parse(snapshot_date).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "rfm.snapshot_date `{snapshot_date}` is not an ISO date"
            ))
        })?;
        Ok(Self { snapshot })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(&config.rfm.snapshot_date)
    }

    // Parses every timestamp and rejects a batch that mixes naive and aware values
    fn parse_times(&self, records: &[CleanTransaction]) -> Result<Vec<NaiveDateTime>, PipelineError> {
        let mut batch_kind: Option<TimestampKind> = None;
        let mut times = Vec::with_capacity(records.len());

        for tx in records {
            let raw = &tx.transaction_start_time;
            let parsed = Timestamp::parse(raw).ok_or_else(|| PipelineError::TimestampParse {
                stage: Self::NAME,
                column: TIME_COLUMN,
                value: raw.clone(),
            })?;

            match batch_kind {
                None => batch_kind = Some(parsed.kind()),
                Some(kind) if kind.is_aware() != parsed.kind().is_aware() => {
                    return Err(PipelineError::TimezoneMismatch {
                        stage: Self::NAME,
                        expected: kind.describe(),
                        found: parsed.kind().describe(),
                        value: raw.clone(),
                    });
                }
                Some(_) => {}
            }
            times.push(parsed.instant());
        }

        if let Some(kind) = batch_kind {
            if !self.snapshot.is_compatible_with(kind) {
                return Err(PipelineError::TimezoneMismatch {
                    stage: Self::NAME,
                    expected: kind.describe(),
                    found: self.snapshot.kind().describe(),
                    value: "rfm.snapshot_date".to_string(),
                });
            }
        }

        Ok(times)
    }
}

impl Stage for RfmTransformer {
    type Input = CleanTransaction;
    type Output = RfmRecord;

    const NAME: &'static str = "rfm";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["CustomerId", "Amount", TIME_COLUMN];

    fn transform(&self, records: &[CleanTransaction]) -> Result<Vec<RfmRecord>, PipelineError> {
        let times = self.parse_times(records)?;

        let mut customers: BTreeMap<&str, CustomerTotals> = BTreeMap::new();
        for (tx, time) in records.iter().zip(times) {
            customers
                .entry(tx.customer_id.as_str())
                .and_modify(|totals| {
                    totals.latest = totals.latest.max(time);
                    totals.count += 1;
                    totals.total += tx.amount;
                })
                .or_insert(CustomerTotals {
                    latest: time,
                    count: 1,
                    total: tx.amount,
                });
        }

        let rfm: Vec<RfmRecord> = customers
            .into_iter()
            .map(|(customer_id, totals)| RfmRecord {
                customer_id: customer_id.to_string(),
                recency: self.snapshot.days_since(totals.latest),
                frequency: totals.count,
                monetary: totals.total,
                avg_amount: totals.total / totals.count as f64,
            })
            .collect();

        debug!(snapshot = %self.snapshot.instant(), "Recency measured against snapshot");
        info!(transactions = records.len(), customers = rfm.len(), "Computed RFM features");
        Ok(rfm)
    }
}
