pub mod bronze;
pub mod config;
pub mod download;
pub mod fetch;
pub mod gold;
pub mod models;
pub mod output;
pub mod parsing;
pub mod pipeline;
pub mod silver;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod utility;
