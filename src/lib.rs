pub mod analyzers;
pub mod config;
pub mod output;
pub mod parser;
pub mod stats;
pub mod table;
