pub mod database;
pub mod factory;
pub mod inmemory;
pub mod rocksdb;
pub mod submission;

#[cfg(test)]
mod tests;

pub use crate::{
    database::Database,
    factory::{DatabaseConfig, create_storage},
    submission::{BatchSummary, SubmissionOutcome, SubmissionRecord},
};
