pub mod scan_batcher;
pub mod scan_dataset;
