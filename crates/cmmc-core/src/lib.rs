pub mod catalog;
pub mod config_manager;
pub mod error;
pub mod types;
pub mod validation;

pub use catalog::{CatalogError, ComplianceCatalog};
pub use config_manager::*;
pub use error::{CmmcError, Result};
pub use types::*;
pub use validation::ValidationEcho;
