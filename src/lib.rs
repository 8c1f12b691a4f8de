// Re-export modules for benchmarking and testing
pub mod database;
pub mod parallel_processor;
pub mod parser;
pub mod processor;
pub mod report;
pub mod tracker;
pub mod types;
