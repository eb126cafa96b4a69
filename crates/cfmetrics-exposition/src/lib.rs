pub mod error;
pub mod parser;
pub mod render;
pub mod types;

pub use error::{ExpositionError, Result};
pub use parser::decode;
pub use render::{encode, encode_family};
pub use types::{MetricFamilies, MetricFamily, MetricSeries, MetricType, MetricValue};

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
