//! # Redress Workflow Engine
//!
//! Drives complaints through organization-defined workflows:
//!
//! - [`definitions`]: validated CRUD over workflow definitions
//! - [`templates`]: the read-only catalog of pre-built stage graphs
//! - [`executor`]: runs a stage's NOTIFICATION / STATUS_UPDATE / ASSIGNMENT / ESCALATION actions
//! - [`engine`]: the per-complaint instance state machine
//! - [`scheduler`]: timed transitions and SLA escalation
//! - [`lifecycle`]: complaint creation and manual status edits
//! - [`api`]: the REST surface hosting all of the above

pub mod api;
pub mod definitions;
pub mod engine;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod scheduler;
pub mod state_machine;
pub mod templates;

use std::sync::Arc;

use redress_database::{ComplaintStore, DefinitionStore, DirectoryStore, InstanceStore, NotificationStore};
use redress_messaging::Notifier;

pub use definitions::{CreateDefinitionRequest, DefinitionService, InstantiateTemplateRequest, UpdateDefinitionRequest};
pub use engine::WorkflowEngine;
pub use executor::{StageActionExecutor, StageOutcome};
pub use lifecycle::{ComplaintLifecycle, CreateComplaintRequest};
pub use scheduler::{SweepReport, TimedTransitionScheduler};
pub use state_machine::Trigger;
pub use templates::{TemplateCategory, TemplateLibrary, WorkflowTemplate};

/// Persistence collaborators, usually all backed by one store.
#[derive(Clone)]
pub struct Stores {
    pub definitions: Arc<dyn DefinitionStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub complaints: Arc<dyn ComplaintStore>,
    pub directory: Arc<dyn DirectoryStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: DefinitionStore + InstanceStore + ComplaintStore + DirectoryStore + NotificationStore + 'static,
    {
        Self {
            definitions: store.clone(),
            instances: store.clone(),
            complaints: store.clone(),
            directory: store.clone(),
            notifications: store,
        }
    }
}

/// Every service, constructed once at startup and handed to the API layer
/// and the scheduler task.
#[derive(Clone)]
pub struct Services {
    pub stores: Stores,
    pub engine: WorkflowEngine,
    pub definitions: Arc<DefinitionService>,
    pub lifecycle: ComplaintLifecycle,
    pub scheduler: TimedTransitionScheduler,
}

impl Services {
    pub fn new(stores: Stores, notifier: Arc<dyn Notifier>, templates: Arc<TemplateLibrary>) -> Self {
        let executor = StageActionExecutor::new(stores.directory.clone(), stores.complaints.clone(), notifier);
        let engine = WorkflowEngine::new(
            stores.definitions.clone(),
            stores.instances.clone(),
            stores.complaints.clone(),
            executor,
        );
        let definitions = Arc::new(DefinitionService::new(
            stores.definitions.clone(),
            stores.instances.clone(),
            stores.directory.clone(),
            templates,
        ));
        let lifecycle = ComplaintLifecycle::new(engine.clone(), stores.complaints.clone(), stores.directory.clone());
        let scheduler = TimedTransitionScheduler::new(engine.clone(), stores.instances.clone(), stores.complaints.clone());

        Self {
            stores,
            engine,
            definitions,
            lifecycle,
            scheduler,
        }
    }
}
