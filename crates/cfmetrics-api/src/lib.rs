pub mod handlers;
pub mod router;

pub use router::{ApiState, SCRAPE_PATH, api_router};
