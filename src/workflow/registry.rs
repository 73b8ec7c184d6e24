//! Instance Registry
//!
//! Creates workflow instances, starts their bodies on the tokio runtime and
//! looks them up by identifier. A registry is an ordinary value; tests and
//! hosts can keep as many independent registries as they need.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use log::{error, info};
use thiserror::Error;
use tokio::runtime::Handle;
use uuid::Uuid;

use super::instance::Instance;
use super::model::{CreateOptions, Workflow, WorkflowEvent};
use super::settings::EngineSettings;
use crate::execution::engine::{drive, RunOutcome};
use crate::execution::events::EventWaits;
use crate::execution::gate::SuspensionGate;
use crate::execution::middleware::{PauseOnGate, StepMiddleware};
use crate::execution::step::{StepExecutor, WorkflowStep};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Workflow instance with id {0} not found")]
    NotFound(String),

    #[error("Workflow instance with id {0} already exists")]
    DuplicateId(String),

    #[error("Workflow instances can only be created inside a tokio runtime")]
    NoRuntime,
}

/// Owner of all instances, keyed by identifier.
#[derive(Default)]
pub struct Registry {
    settings: EngineSettings,
    instances: RwLock<HashMap<String, Arc<Instance>>>,
}

impl Registry {
    /// Creates a registry with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        Self {
            settings,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Creates an instance and starts its body on the current tokio runtime.
    pub fn create<W: Workflow>(
        &self,
        options: CreateOptions<W::Params>,
        workflow: W,
    ) -> Result<Arc<Instance>, RegistryError> {
        self.create_with_middleware(options, workflow, Vec::new())
    }

    /// Creates an instance whose steps also pass through `middleware`.
    ///
    /// The extra middleware wraps the built-in pause gate: its `before_task`
    /// hooks run first and its `after_task` hooks run last.
    pub fn create_with_middleware<W: Workflow>(
        &self,
        options: CreateOptions<W::Params>,
        workflow: W,
        middleware: Vec<Arc<dyn StepMiddleware>>,
    ) -> Result<Arc<Instance>, RegistryError> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        let id = options
            .id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let step_gate = Arc::new(SuspensionGate::new(false));
        let mut chain = middleware;
        chain.push(Arc::new(PauseOnGate::new(Arc::clone(&step_gate))));

        let step = WorkflowStep::new(
            Arc::new(StepExecutor::new(&self.settings, chain)),
            Arc::new(EventWaits::new(self.settings.enforce_event_timeouts)),
        );
        let instance = Arc::new(Instance::new(id.clone(), step_gate, step.clone()));

        {
            let mut instances = self.write();
            if instances.contains_key(&id) {
                return Err(RegistryError::DuplicateId(id));
            }
            instances.insert(id.clone(), Arc::clone(&instance));
        }

        let event = WorkflowEvent {
            payload: options.params,
            timestamp: Utc::now(),
            instance_id: id.clone(),
        };

        info!("Created workflow instance '{}'", id);
        runtime.spawn(run_instance(workflow, event, step, Arc::clone(&instance)));

        Ok(instance)
    }

    /// Looks up an instance by identifier.
    pub fn get(&self, id: &str) -> Result<Arc<Instance>, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Drops an instance from the registry. A running body keeps running.
    pub fn remove(&self, id: &str) -> Option<Arc<Instance>> {
        self.write().remove(id)
    }

    /// Identifiers of all instances, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Instance>>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Instance>>> {
        self.instances.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives the body on its own task so a panic is reported as `errored`.
async fn run_instance<W: Workflow>(
    workflow: W,
    event: WorkflowEvent<W::Params>,
    step: WorkflowStep,
    instance: Arc<Instance>,
) {
    let body = tokio::spawn(async move { drive(&workflow, event, &step).await });

    let outcome = match body.await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            error!("Instance '{}' body panicked: {}", instance.id(), join_error);
            RunOutcome::Errored(format!("Workflow body panicked: {}", join_error))
        }
    };

    instance.finish(outcome);
}
