pub mod assemble;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod metrics;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod records;
pub mod stats;
pub mod store;
pub mod table;
