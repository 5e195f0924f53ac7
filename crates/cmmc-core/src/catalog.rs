use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config_manager::DataConfig;
use crate::error::{CmmcError, Result};
use crate::types::{Assessment, Objective, OrgId, Practice, PracticeId};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Data file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The three static lookup tables, loaded once and never mutated
#[derive(Debug, Clone, Default)]
pub struct ComplianceCatalog {
    practices: Vec<Practice>,
    objectives: Vec<Objective>,
    assessments: Vec<Assessment>,
}

impl ComplianceCatalog {
    pub fn new(
        practices: Vec<Practice>,
        objectives: Vec<Objective>,
        assessments: Vec<Assessment>,
    ) -> Self {
        Self {
            practices,
            objectives,
            assessments,
        }
    }

    /// Load practices, objectives and assessments from the configured data directory
    pub fn load(data: &DataConfig) -> std::result::Result<Self, CatalogError> {
        let practices: Vec<Practice> = read_table(&data.practices_path())?;
        let objectives: Vec<Objective> = read_table(&data.objectives_path())?;
        let assessments: Vec<Assessment> = read_table(&data.assessments_path())?;

        info!(
            practices = practices.len(),
            objectives = objectives.len(),
            assessments = assessments.len(),
            data_dir = %data.dir.display(),
            "Loaded compliance catalog"
        );

        Ok(Self::new(practices, objectives, assessments))
    }

    pub fn practices(&self) -> &[Practice] {
        &self.practices
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    /// Practice and objective tables are both required for selection
    pub fn has_practice_data(&self) -> bool {
        !self.practices.is_empty() && !self.objectives.is_empty()
    }

    /// Unique organization ids in first-seen order
    pub fn org_ids(&self) -> Vec<&OrgId> {
        let mut seen = HashSet::new();
        self.assessments
            .iter()
            .map(|a| &a.org_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Selector labels in table order
    pub fn practice_labels(&self) -> Vec<String> {
        self.practices.iter().map(Practice::label).collect()
    }

    pub fn practice(&self, id: &PracticeId) -> Option<&Practice> {
        self.practices.iter().find(|p| &p.id == id)
    }

    /// Resolve a practice from a selector label, internal id or practice code.
    ///
    /// Labels are tried first so a full `"<code> - <title>"` selection always
    /// wins over a coincidental id match.
    pub fn find_practice(&self, selector: &str) -> Option<&Practice> {
        let selector = selector.trim();
        self.practices
            .iter()
            .find(|p| p.label() == selector)
            .or_else(|| self.practices.iter().find(|p| p.id.as_str() == selector))
            .or_else(|| self.practices.iter().find(|p| p.practice_id == selector))
    }

    pub fn select_practice(&self, selector: &str) -> Result<&Practice> {
        self.find_practice(selector)
            .ok_or_else(|| CmmcError::PracticeNotFound(selector.to_string()))
    }

    /// Objectives whose foreign key matches the practice's internal id
    pub fn objectives_for(&self, practice: &PracticeId) -> Vec<&Objective> {
        let objectives: Vec<&Objective> = self
            .objectives
            .iter()
            .filter(|o| &o.practice_id == practice)
            .collect();
        debug!(practice = %practice, count = objectives.len(), "Filtered objectives");
        objectives
    }
}

fn read_table<T: DeserializeOwned>(path: &Path) -> std::result::Result<Vec<T>, CatalogError> {
    if !path.exists() {
        return Err(CatalogError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
