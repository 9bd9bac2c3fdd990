//! Run persistence seam.
//!
//! The engine never talks to a database directly; completion goes through
//! [`RunStore`]. Hosts back it with their own storage. [`MemoryRunStore`]
//! is the in-process implementation used by tests and embedded setups.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::workflow::types::{StepValue, Workflow, WorkflowRun};

/// Everything the orchestrator needs to complete one run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Workflow definition the run executes.
    pub workflow: Workflow,

    /// The run itself.
    pub run: WorkflowRun,

    /// All step values collected so far.
    pub values: Vec<StepValue>,
}

/// Storage operations the completion path depends on.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Load a run with its workflow definition and collected values.
    async fn load_run_context(&self, run_id: Uuid) -> EngineResult<RunSnapshot>;

    /// Persist derived values and mark the run complete, atomically.
    ///
    /// Implementations must write `derived` and flip the completion flag
    /// in one transaction so a failed write never leaves a half-completed
    /// run behind.
    async fn mark_run_complete(
        &self,
        run_id: Uuid,
        derived: &[StepValue],
    ) -> EngineResult<WorkflowRun>;
}

/// In-memory [`RunStore`].
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
    runs: RwLock<HashMap<Uuid, WorkflowRun>>,
    values: RwLock<HashMap<Uuid, Vec<StepValue>>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow definition.
    pub async fn put_workflow(&self, workflow: Workflow) {
        self.workflows.write().await.insert(workflow.id, workflow);
    }

    /// Start a new run of a workflow.
    pub async fn create_run(&self, workflow_id: Uuid) -> EngineResult<WorkflowRun> {
        if !self.workflows.read().await.contains_key(&workflow_id) {
            return Err(EngineError::Store(format!(
                "workflow {} not found",
                workflow_id
            )));
        }
        let run = WorkflowRun::new(workflow_id);
        self.runs.write().await.insert(run.id, run.clone());
        self.values.write().await.insert(run.id, Vec::new());
        Ok(run)
    }

    /// Record (or overwrite) one step value. Completed runs reject writes.
    pub async fn put_value(&self, value: StepValue) -> EngineResult<()> {
        // Hold the run lock across the value write so a completion cannot
        // slip between the check and the write; same runs-then-values
        // order as mark_run_complete.
        let runs = self.runs.read().await;
        let run = runs
            .get(&value.run_id)
            .ok_or(EngineError::RunNotFound(value.run_id))?;
        if run.completed {
            return Err(EngineError::AlreadyCompleted(run.id));
        }

        let mut values = self.values.write().await;
        let entries = values.entry(value.run_id).or_default();
        if let Some(existing) = entries.iter_mut().find(|v| v.step_id == value.step_id) {
            *existing = value;
        } else {
            entries.push(value);
        }
        Ok(())
    }

    /// Fetch a run by id.
    pub async fn get_run(&self, run_id: Uuid) -> EngineResult<WorkflowRun> {
        self.runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(EngineError::RunNotFound(run_id))
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn load_run_context(&self, run_id: Uuid) -> EngineResult<RunSnapshot> {
        let run = self
            .runs
            .read()
            .await
            .get(&run_id)
            .cloned()
            .ok_or(EngineError::RunNotFound(run_id))?;
        let workflow = self
            .workflows
            .read()
            .await
            .get(&run.workflow_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::Store(format!(
                    "workflow {} missing for run {}",
                    run.workflow_id, run_id
                ))
            })?;
        let values = self
            .values
            .read()
            .await
            .get(&run_id)
            .cloned()
            .unwrap_or_default();

        Ok(RunSnapshot {
            workflow,
            run,
            values,
        })
    }

    async fn mark_run_complete(
        &self,
        run_id: Uuid,
        derived: &[StepValue],
    ) -> EngineResult<WorkflowRun> {
        // Hold the run lock across the value write so completion is
        // all-or-nothing even with concurrent writers.
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&run_id)
            .ok_or(EngineError::RunNotFound(run_id))?;
        if run.completed {
            return Err(EngineError::AlreadyCompleted(run_id));
        }

        let mut values = self.values.write().await;
        let entries = values.entry(run_id).or_default();
        for value in derived {
            if let Some(existing) = entries.iter_mut().find(|v| v.step_id == value.step_id) {
                *existing = value.clone();
            } else {
                entries.push(value.clone());
            }
        }

        run.completed = true;
        run.completed_at = Some(Utc::now());
        tracing::debug!(run_id = %run_id, derived = derived.len(), "run marked complete");
        Ok(run.clone())
    }
}
