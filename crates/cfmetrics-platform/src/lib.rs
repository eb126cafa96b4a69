pub mod fetcher;
pub mod resolver;
pub mod types;

pub use fetcher::{HttpInstanceFetcher, INSTANCE_HEADER, InstanceFetcher};
pub use resolver::{CfResolver, InstanceResolver};
pub use types::{AppInstances, CfApiConfig, FetcherConfig};
