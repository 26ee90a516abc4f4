// Stage contract and the fixed cleaner → RFM → risk labeler chain.

use tracing::info;
use crate::cleaner::DataCleaner;
use crate::config::PipelineConfig;
use crate::csv_reader::Transaction;
use crate::error::PipelineError;
use crate::kmeans::{LabeledRecord, RiskLabelGenerator, RiskModel};
use crate::rfm::RfmTransformer;

/// A transform step. Stateless stages keep the default no-op `fit`.
pub trait Stage {
    type Input;
    type Output;

    /// Name reported in errors and logs
    const NAME: &'static str;
    /// Input columns the stage reads
    const REQUIRED_COLUMNS: &'static [&'static str];

    fn fit(&mut self, _records: &[Self::Input]) -> Result<(), PipelineError> {
        Ok(())
    }

    fn transform(&self, records: &[Self::Input]) -> Result<Vec<Self::Output>, PipelineError>;

    fn fit_transform(&mut self, records: &[Self::Input]) -> Result<Vec<Self::Output>, PipelineError> {
        self.fit(records)?;
        self.transform(records)
    }
}

/// Raw transactions in, one labeled RFM record per customer out.
///
/// Each instance owns its clustering state; `fit_transform` discards it and
/// fits again on the new batch.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    cleaner: DataCleaner,
    rfm: RfmTransformer,
    labeler: RiskLabelGenerator,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            cleaner: DataCleaner::new(&config),
            rfm: RfmTransformer::from_config(&config)?,
            labeler: RiskLabelGenerator::from_config(&config.risk),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Raw columns read by the stages that consume raw-schema rows, paired with the stage name.
    pub fn required_columns() -> Vec<(&'static str, &'static str)> {
        let cleaner = DataCleaner::REQUIRED_COLUMNS
            .iter()
            .map(|column| (DataCleaner::NAME, *column));
        let rfm = RfmTransformer::REQUIRED_COLUMNS
            .iter()
            .map(|column| (RfmTransformer::NAME, *column));
        cleaner.chain(rfm).collect()
    }

    /// Fails on the first required column absent from `columns`.
    pub fn check_columns(columns: &[&str]) -> Result<(), PipelineError> {
        match Self::required_columns()
            .into_iter()
            .find(|(_, column)| !columns.contains(column))
        {
            Some((stage, column)) => Err(PipelineError::MissingColumn { stage, column }),
            None => Ok(()),
        }
    }

    pub fn fit_transform(&mut self, raw: &[Transaction]) -> Result<Vec<LabeledRecord>, PipelineError> {
        info!(rows = raw.len(), "Fitting pipeline");
        let cleaned = self.cleaner.fit_transform(raw)?;
        let rfm = self.rfm.fit_transform(&cleaned)?;
        self.labeler.fit_transform(&rfm)
    }

    /// Labels a new batch with the clusters learned by the last `fit_transform`.
    pub fn transform(&self, raw: &[Transaction]) -> Result<Vec<LabeledRecord>, PipelineError> {
        if self.labeler.model().is_none() {
            return Err(PipelineError::NotFitted {
                stage: RiskLabelGenerator::NAME,
            });
        }
        let cleaned = self.cleaner.transform(raw)?;
        let rfm = self.rfm.transform(&cleaned)?;
        self.labeler.transform(&rfm)
    }

    pub fn risk_model(&self) -> Option<&RiskModel> {
        self.labeler.model()
    }
}
