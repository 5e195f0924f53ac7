use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config_manager::ConfigError;

#[derive(Error, Debug)]
pub enum CmmcError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Practice not found: {0}")]
    PracticeNotFound(String),
}

pub type Result<T> = std::result::Result<T, CmmcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_catalog_errors_pass_through_unchanged() {
        let err: CmmcError = CatalogError::NotFound {
            path: PathBuf::from("data/practices.json"),
        }
        .into();
        assert_eq!(err.to_string(), "Data file not found: data/practices.json");

        let missing = CmmcError::PracticeNotFound("AC.L2-3.1.9".to_string());
        assert_eq!(missing.to_string(), "Practice not found: AC.L2-3.1.9");
    }
}
