pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod extract;
pub mod feature;
mod metrics;
pub mod results;
pub mod searcher;
pub mod server;
pub mod similarity;
pub mod store;
pub mod topk;
pub mod utils;

pub use config::Opts;
pub use error::{CbirError, Result};
pub use feature::{FeatureRecord, FeatureType, FeatureValue, FeatureView};
pub use searcher::Searcher;
pub use store::{FeatureStore, FeatureStoreBuilder};
pub use topk::{Match, QueryResult, TopK};
