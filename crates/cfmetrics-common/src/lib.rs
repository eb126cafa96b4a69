pub mod error;
pub mod identity;
pub mod time;

pub use error::{ExporterError, Result};
pub use identity::IdentityContext;
