use tracing::{debug, info};
use crate::config::PipelineConfig;
use crate::csv_reader::Transaction;
use crate::error::PipelineError;
use crate::pipeline::Stage;

pub const MISSING_CATEGORY: &str = "missing";

// Transaction row after capping and imputation: no optional fields remain
#[derive(Debug, Clone, PartialEq)]
pub struct CleanTransaction {
    pub customer_id: String,
    pub amount: f64,
    pub product_category: String,
    pub transaction_start_time: String,
}

impl From<CleanTransaction> for Transaction {
    fn from(clean: CleanTransaction) -> Self {
        Transaction {
            customer_id: clean.customer_id,
            amount: Some(clean.amount),
            product_category: Some(clean.product_category),
            transaction_start_time: clean.transaction_start_time,
        }
    }
}

// Caps outlier amounts and fills gaps. Holds nothing but the configured cap.
#[derive(Debug, Clone)]
pub struct DataCleaner {
    amount_cap: f64,
}

impl DataCleaner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_cap(config.outlier_caps.amount)
    }

    pub fn with_cap(amount_cap: f64) -> Self {
        Self { amount_cap }
    }

    pub fn amount_cap(&self) -> f64 {
        self.amount_cap
    }
}

// Median of the values, averaging the two middle ones for even counts
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

impl Stage for DataCleaner {
    type Input = Transaction;
    type Output = CleanTransaction;

    const NAME: &'static str = "cleaner";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["Amount", "ProductCategory"];

    fn transform(&self, records: &[Transaction]) -> Result<Vec<CleanTransaction>, PipelineError> {
        // Cap first so the imputed median is taken over the clipped column
        let capped: Vec<Option<f64>> = records
            .iter()
            .map(|tx| tx.present_amount().map(|amount| amount.min(self.amount_cap)))
            .collect();

        let mut present: Vec<f64> = capped.iter().flatten().copied().collect();
        let missing_amounts = records.len() - present.len();
        let fill = match median(&mut present) {
            Some(value) => value,
            None if missing_amounts == 0 => 0.0,
            None => {
                return Err(PipelineError::Imputation {
                    stage: Self::NAME,
                    column: "Amount",
                })
            }
        };
        debug!(cap = self.amount_cap, median = fill, missing_amounts, "Amount imputation");

        let mut missing_categories = 0usize;
        let cleaned: Vec<CleanTransaction> = records
            .iter()
            .zip(capped)
            .map(|(tx, amount)| {
                let product_category = match &tx.product_category {
                    Some(category) => category.clone(),
                    None => {
                        missing_categories += 1;
                        MISSING_CATEGORY.to_string()
                    }
                };
                CleanTransaction {
                    customer_id: tx.customer_id.clone(),
                    amount: amount.unwrap_or(fill),
                    product_category,
                    transaction_start_time: tx.transaction_start_time.clone(),
                }
            })
            .collect();

        info!(
            rows = cleaned.len(),
            missing_amounts, missing_categories, "Cleaned transactions"
        );
        Ok(cleaned)
    }
}
