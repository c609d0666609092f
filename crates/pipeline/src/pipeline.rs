//! Execution pipeline.
//!
//! [`ExecutionPipeline::execute`] validates a request, records a history
//! entry, optionally syncs the project, resolves the inventory, builds the
//! ansible invocation and hands the run to the worker pool. The caller gets
//! the history id as soon as the run is queued; output streams into the
//! history entry while the run progresses.

use std::sync::Arc;

use helmsman_core::arguments;
use helmsman_core::execution::{ExecutionKind, ExecutionRequest};
use helmsman_core::history::{HistoryStatus, INITIATOR_PROJECT, INITIATOR_SCHEDULER, INITIATOR_TEMPLATE};
use helmsman_core::hooks::HookWhen;
use helmsman_core::project;
use helmsman_core::scripting::subprocess::SupervisedExit;
use helmsman_core::types::DbId;
use helmsman_core::variables::{self, Variables};
use helmsman_db::models::history::{CreateHistory, HistoryRunDetails};
use helmsman_db::models::project::Project;
use helmsman_db::repositories::{HistoryRepo, ProjectRepo};
use helmsman_db::DbPool;
use helmsman_events::{EventBus, LifecycleEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{AnsibleBackend, ExecutionBackend};
use crate::cancellation::CancellationRegistry;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::inventory;
use crate::invocation::Invocation;
use crate::repo::RepoManager;
use crate::workers::WorkerPool;
use crate::workspace::RunWorkspace;

pub const EMPTY_TARGET_MSG: &str = "Empty playbook/module name.";

// ---------------------------------------------------------------------------
// ExecutionOrigin
// ---------------------------------------------------------------------------

/// Who started an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrigin {
    pub initiator_type: String,
    /// Template or periodic task id.
    pub initiator: Option<DbId>,
    /// Template option the request was expanded with.
    pub template_option: Option<String>,
}

impl ExecutionOrigin {
    /// Direct run from a project.
    pub fn project() -> Self {
        Self {
            initiator_type: INITIATOR_PROJECT.to_string(),
            initiator: None,
            template_option: None,
        }
    }

    pub fn template(template_id: DbId, option: Option<String>) -> Self {
        Self {
            initiator_type: INITIATOR_TEMPLATE.to_string(),
            initiator: Some(template_id),
            template_option: option,
        }
    }

    pub fn scheduler(task_id: DbId, template_option: Option<String>) -> Self {
        Self {
            initiator_type: INITIATOR_SCHEDULER.to_string(),
            initiator: Some(task_id),
            template_option,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionPipeline
// ---------------------------------------------------------------------------

/// Shared handle to the execution machinery. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    pool: DbPool,
    config: Arc<PipelineConfig>,
    repos: RepoManager,
    backend: Arc<dyn ExecutionBackend>,
    workers: WorkerPool,
    cancellations: CancellationRegistry,
    events: Arc<EventBus>,
}

/// Everything a queued run needs.
struct PreparedRun {
    invocation: Invocation,
    /// Kept alive until the run ends; holds the inventory and key files.
    workspace: RunWorkspace,
}

impl ExecutionPipeline {
    pub fn new(
        pool: DbPool,
        config: PipelineConfig,
        events: Arc<EventBus>,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Result<Self, PipelineError> {
        let config = config
            .absolutized()
            .map_err(|e| PipelineError::Execution(format!("Cannot resolve projects dir: {e}")))?;
        let config = Arc::new(config);
        let repos = RepoManager::new(Arc::clone(&config))?;
        let workers = WorkerPool::new(config.worker_concurrency);
        Ok(Self {
            inner: Arc::new(Inner {
                pool,
                config,
                repos,
                backend,
                workers,
                cancellations: CancellationRegistry::default(),
                events,
            }),
        })
    }

    /// Pipeline running the real ansible binaries.
    pub fn with_ansible(
        pool: DbPool,
        config: PipelineConfig,
        events: Arc<EventBus>,
    ) -> Result<Self, PipelineError> {
        Self::new(pool, config, events, Arc::new(AnsibleBackend))
    }

    pub fn pool(&self) -> &DbPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn repos(&self) -> &RepoManager {
        &self.inner.repos
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Start a run and return its history id.
    ///
    /// Invalid requests fail before any history entry exists. Failures
    /// after that point (sync, inventory, invocation) leave the entry in
    /// ERROR with the error text appended to its output.
    pub async fn execute(
        &self,
        project_id: DbId,
        request: ExecutionRequest,
        origin: ExecutionOrigin,
    ) -> Result<DbId, PipelineError> {
        let project = ProjectRepo::find_by_id(self.pool(), project_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "project",
                id: project_id,
            })?;
        if request.target.trim().is_empty() {
            return Err(PipelineError::Validation(EMPTY_TARGET_MSG.to_string()));
        }
        let project_dir = self.config().project_dir(project_id);
        let inventory = request.inventory.clone().normalized();
        inventory::check(self.pool(), project_id, &project_dir, &inventory).await?;

        // Project variables only supply options this kind understands.
        let defaults: Variables = project::execution_defaults(&project.vars)
            .into_iter()
            .filter(|(k, _)| arguments::arg_kind(request.kind, k).is_some())
            .collect();
        let run_vars = variables::merge([&defaults, &request.vars]);
        arguments::validate_args(request.kind, &run_vars)?;

        let mut options = serde_json::json!({ "vars": variables::redacted(&run_vars) });
        if request.kind == ExecutionKind::Module {
            options["group"] = serde_json::json!(request.group);
            options["args"] = serde_json::json!(request.args);
        }
        if let Some(option) = &origin.template_option {
            options["template_option"] = serde_json::json!(option);
        }

        let history = HistoryRepo::create(
            self.pool(),
            &CreateHistory {
                project_id,
                mode: request.target.trim().to_string(),
                kind: request.kind,
                initiator: origin.initiator,
                initiator_type: origin.initiator_type.clone(),
                inventory_id: inventory.stored_id(),
                revision: project.revision.clone(),
                options,
            },
        )
        .await?;
        let history_id = history.id;
        tracing::info!(
            history_id,
            project_id,
            kind = %request.kind,
            target = %history.mode,
            initiator_type = %origin.initiator_type,
            "Execution accepted"
        );

        let request = ExecutionRequest {
            inventory,
            vars: run_vars,
            ..request
        };
        match self.prepare(&project, &request, history_id).await {
            Ok(prepared) => self.launch(project_id, history_id, prepared).await,
            Err(e) => {
                self.abort(project_id, history_id, &e).await;
                Err(e)
            }
        }
    }

    /// Ask a running execution to stop.
    ///
    /// The child process group is terminated and the entry ends up
    /// INTERRUPTED once the worker observes the exit.
    pub async fn cancel(&self, history_id: DbId) -> Result<String, PipelineError> {
        let history = HistoryRepo::find_by_id(self.pool(), history_id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "history",
                id: history_id,
            })?;
        if history.status != HistoryStatus::Run {
            return Err(PipelineError::InvalidState(format!(
                "History {history_id} is {}, only running executions can be canceled",
                history.status
            )));
        }
        if !self.inner.cancellations.cancel(history_id) {
            return Err(PipelineError::InvalidState(format!(
                "History {history_id} is not running in this process"
            )));
        }
        tracing::info!(history_id, "Execution cancel requested");
        Ok(format!("Task canceled: {history_id}"))
    }

    /// Interrupt running executions and wait for the workers to drain.
    pub async fn shutdown(&self) {
        let interrupted = self.inner.cancellations.cancel_all();
        if interrupted > 0 {
            tracing::info!(interrupted, "Interrupting running executions");
        }
        self.inner.workers.shutdown().await;
    }

    /// Publish an object lifecycle event.
    pub fn publish_object(&self, when: HookWhen, entity: &str, id: DbId, payload: serde_json::Value) {
        self.inner
            .events
            .publish(LifecycleEvent::new(when).with_source(entity, id).with_payload(payload));
    }

    // -- steps ---------------------------------------------------------------

    async fn prepare(
        &self,
        project: &Project,
        request: &ExecutionRequest,
        history_id: DbId,
    ) -> Result<PreparedRun, PipelineError> {
        let mut revision = project.revision.clone();
        if project::sync_on_run(&project.vars) {
            let synced = self.inner.repos.sync(self.pool(), project.id).await?;
            revision = synced.revision;
        }

        let project_dir = self.config().project_dir(project.id);
        tokio::fs::create_dir_all(&project_dir)
            .await
            .map_err(|e| PipelineError::Execution(format!("Cannot create project dir: {e}")))?;
        let rendered =
            inventory::resolve(self.pool(), project.id, &project_dir, &request.inventory).await?;

        let workspace = RunWorkspace::create()
            .await
            .map_err(|e| PipelineError::Execution(format!("Cannot create run workspace: {e}")))?;
        let keys = workspace.key_files();
        let inventory_arg = rendered.materialize(&workspace, &keys).await?;
        let vars: Variables = request
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), keys.substitute(k, v)))
            .collect();
        keys.write()
            .await
            .map_err(|e| PipelineError::Execution(format!("Cannot write key file: {e}")))?;

        let invocation =
            Invocation::build(self.config(), request, &inventory_arg, &vars, &project_dir)?;
        let shown = Invocation::build(
            self.config(),
            request,
            &inventory_arg,
            &variables::redacted(&request.vars),
            &project_dir,
        )?;
        HistoryRepo::set_run_details(
            self.pool(),
            history_id,
            &HistoryRunDetails {
                raw_args: shown.command_line(),
                raw_inventory: rendered.raw_inventory,
                revision,
            },
        )
        .await?;

        Ok(PreparedRun {
            invocation,
            workspace,
        })
    }

    async fn launch(
        &self,
        project_id: DbId,
        history_id: DbId,
        prepared: PreparedRun,
    ) -> Result<DbId, PipelineError> {
        let token = self.inner.cancellations.register(history_id);
        let started =
            HistoryRepo::transition(self.pool(), history_id, HistoryStatus::Delay, HistoryStatus::Run)
                .await;
        match started {
            Ok(true) => {}
            Ok(false) => {
                self.inner.cancellations.remove(history_id);
                return Err(PipelineError::InvalidState(format!(
                    "History {history_id} left DELAY before it could start"
                )));
            }
            Err(e) => {
                self.inner.cancellations.remove(history_id);
                return Err(e.into());
            }
        }
        self.publish_execution(HookWhen::OnExecution, project_id, history_id, HistoryStatus::Run);

        let this = self.clone();
        self.inner.workers.submit(async move {
            this.run_job(project_id, history_id, prepared, token).await;
        });
        Ok(history_id)
    }

    async fn run_job(
        &self,
        project_id: DbId,
        history_id: DbId,
        prepared: PreparedRun,
        token: CancellationToken,
    ) {
        tracing::info!(history_id, "Execution started");
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let pool = self.pool().clone();
        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                let chunk = format!("{line}\n");
                if let Err(e) = HistoryRepo::append_stdout(&pool, history_id, &chunk).await {
                    tracing::warn!(history_id, error = %e, "Dropping output line");
                }
            }
        });

        let result = self
            .inner
            .backend
            .run(&prepared.invocation, &token, tx)
            .await;
        if let Err(e) = writer.await {
            tracing::error!(history_id, error = %e, "Output writer failed");
        }

        let (status, note) = match result {
            Ok(SupervisedExit::Exited(0)) => (HistoryStatus::Ok, None),
            Ok(SupervisedExit::Exited(code)) => {
                tracing::warn!(history_id, code, "Execution exited with failure");
                (HistoryStatus::Error, None)
            }
            Ok(SupervisedExit::Cancelled) => (HistoryStatus::Interrupted, None),
            Ok(SupervisedExit::TimedOut) => (
                HistoryStatus::Error,
                Some(format!(
                    "Execution timed out after {:?}.",
                    prepared.invocation.timeout
                )),
            ),
            Err(e) => (HistoryStatus::Error, Some(e.to_string())),
        };
        if let Some(note) = note {
            if let Err(e) = HistoryRepo::append_stdout(self.pool(), history_id, &format!("{note}\n")).await {
                tracing::warn!(history_id, error = %e, "Failed to record execution error");
            }
        }
        self.inner.cancellations.remove(history_id);
        drop(prepared);

        match HistoryRepo::transition(self.pool(), history_id, HistoryStatus::Run, status).await {
            Ok(true) => tracing::info!(history_id, %status, "Execution finished"),
            Ok(false) => tracing::warn!(
                history_id,
                %status,
                "History was finalized elsewhere, result discarded"
            ),
            Err(e) => tracing::error!(history_id, error = %e, "Failed to finalize history"),
        }
        self.publish_execution(HookWhen::AfterExecution, project_id, history_id, status);
    }

    /// Fail an entry that never reached RUN.
    async fn abort(&self, project_id: DbId, history_id: DbId, err: &PipelineError) {
        tracing::error!(history_id, error = %err, "Execution aborted before start");
        if let Err(e) = HistoryRepo::append_stdout(self.pool(), history_id, &format!("{err}\n")).await {
            tracing::warn!(history_id, error = %e, "Failed to record execution error");
        }
        match HistoryRepo::transition(self.pool(), history_id, HistoryStatus::Delay, HistoryStatus::Error)
            .await
        {
            Ok(_) => {}
            Err(e) => tracing::error!(history_id, error = %e, "Failed to mark history ERROR"),
        }
        self.publish_execution(HookWhen::AfterExecution, project_id, history_id, HistoryStatus::Error);
    }

    fn publish_execution(&self, when: HookWhen, project_id: DbId, history_id: DbId, status: HistoryStatus) {
        self.inner.events.publish(
            LifecycleEvent::new(when)
                .with_source("history", history_id)
                .with_payload(serde_json::json!({
                    "history_id": history_id,
                    "project_id": project_id,
                    "status": status,
                })),
        );
    }
}
