//! Workflow Template Library
//!
//! Read-only catalog of pre-built stage graphs, loaded once from the YAML
//! catalog compiled into the binary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redress_models::{validate_stages, Stage, StageAction, Transition, DEFAULT_STAGE_DURATION_HOURS};
use redress_utils::{RedressError, RedressResult};

const BUILTIN_CATALOG: &str = include_str!("../catalog/templates.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    Basic,
    Academic,
    Administrative,
    Facilities,
    ItSupport,
}

impl TemplateCategory {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "basic" => Some(Self::Basic),
            "academic" => Some(Self::Academic),
            "administrative" => Some(Self::Administrative),
            "facilities" => Some(Self::Facilities),
            "it_support" | "it" => Some(Self::ItSupport),
            _ => None,
        }
    }
}

impl std::fmt::Display for TemplateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Academic => write!(f, "academic"),
            Self::Administrative => write!(f, "administrative"),
            Self::Facilities => write!(f, "facilities"),
            Self::ItSupport => write!(f, "it_support"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    category: TemplateCategory,
    stages: Vec<CatalogStage>,
}

/// A stage as written in the catalog; `id` may be left for generation.
#[derive(Debug, Deserialize)]
struct CatalogStage {
    id: Option<String>,
    name: String,
    order: i32,
    #[serde(default = "default_duration")]
    duration_in_hours: u32,
    #[serde(default)]
    actions: Vec<StageAction>,
    #[serde(default)]
    transitions: Vec<Transition>,
}

fn default_duration() -> u32 {
    DEFAULT_STAGE_DURATION_HOURS
}

fn generated_stage_id() -> String {
    format!("stg_{}", Uuid::new_v4().simple())
}

impl CatalogEntry {
    fn build(self) -> RedressResult<WorkflowTemplate> {
        let stages: Vec<Stage> = self
            .stages
            .into_iter()
            .map(|s| Stage {
                id: s.id.unwrap_or_else(generated_stage_id),
                name: s.name,
                order: s.order,
                duration_in_hours: s.duration_in_hours,
                actions: s.actions,
                transitions: s.transitions,
            })
            .collect();

        validate_stages(&stages).map_err(|e| {
            RedressError::Configuration {
                message: format!("Template '{}' is malformed: {}", self.id, e),
            }
        })?;

        Ok(WorkflowTemplate {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            stages,
        })
    }
}

pub struct TemplateLibrary {
    templates: Vec<WorkflowTemplate>,
}

impl TemplateLibrary {
    /// Loads the catalog compiled into the binary.
    pub fn builtin() -> RedressResult<Self> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    pub fn from_yaml(source: &str) -> RedressResult<Self> {
        let entries: Vec<CatalogEntry> = serde_yaml::from_str(source).map_err(|e| RedressError::Configuration {
            message: format!("Invalid template catalog: {}", e),
        })?;

        let mut templates: Vec<WorkflowTemplate> = Vec::with_capacity(entries.len());
        for entry in entries {
            if templates.iter().any(|t| t.id == entry.id) {
                return Err(RedressError::Configuration {
                    message: format!("Duplicate template id '{}'", entry.id),
                });
            }
            templates.push(entry.build()?);
        }

        tracing::debug!(count = templates.len(), "Workflow template catalog loaded");
        Ok(Self { templates })
    }

    pub fn list_all(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    pub fn list_by_category(&self, category: TemplateCategory) -> Vec<&WorkflowTemplate> {
        self.templates.iter().filter(|t| t.category == category).collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }
}
