pub mod args;
pub mod batch;
pub mod calldata;
pub mod digest;
pub mod event;
pub mod field;
pub mod proof;
pub mod serialization;

#[cfg(feature = "test_utils")]
pub mod test_utils;

#[cfg(test)]
mod tests;
