pub mod config;
pub mod error;
pub mod gemini;
pub mod provider;
pub mod records;
pub mod report;
pub mod sheet;
pub mod types;
