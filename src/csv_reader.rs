use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use serde::Deserialize;
use crate::error::PipelineError;
use crate::kmeans::LabeledRecord;
use crate::pipeline::Pipeline;

// One raw transaction row. Columns the pipeline does not use are ignored.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(rename = "CustomerId")]
    pub customer_id: String,
    #[serde(rename = "Amount")]
    pub amount: Option<f64>,
    #[serde(rename = "ProductCategory")]
    pub product_category: Option<String>,
    #[serde(rename = "TransactionStartTime")]
    pub transaction_start_time: String,
}

impl Transaction {
    // NaN is read from the CSV as a number but means the same as an empty cell
    pub fn present_amount(&self) -> Option<f64> {
        self.amount.filter(|amount| !amount.is_nan())
    }
}

pub fn read_transactions<P: AsRef<Path>>(file_path: P) -> Result<Vec<Transaction>, PipelineError> {
    let file = File::open(file_path)?;
    read_transactions_from(file)
}

// Validates the header against every stage's required columns before deserializing.
// Header names are trimmed once by the reader so the check and serde see the same names.
pub fn read_transactions_from<R: Read>(reader: R) -> Result<Vec<Transaction>, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns: Vec<&str> = headers.iter().collect();
    Pipeline::check_columns(&columns)?;

    let transactions: Vec<Transaction> = rdr
        .deserialize()
        .collect::<Result<Vec<Transaction>, csv::Error>>()?;

    Ok(transactions)
}

pub fn write_labeled<P: AsRef<Path>>(file_path: P, records: &[LabeledRecord]) -> Result<(), PipelineError> {
    if let Some(parent) = file_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(file_path)?;
    write_labeled_to(file, records)
}

pub fn write_labeled_to<W: Write>(writer: W, records: &[LabeledRecord]) -> Result<(), PipelineError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
