#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use helmsman_core::history::HistoryStatus;
use helmsman_core::scripting::subprocess::SupervisedExit;
use helmsman_core::types::DbId;
use helmsman_db::models::history::History;
use helmsman_db::models::project::CreateProject;
use helmsman_db::repositories::{HistoryRepo, ProjectRepo};
use helmsman_db::{create_pool, DbPool};
use helmsman_events::EventBus;
use helmsman_pipeline::invocation::Invocation;
use helmsman_pipeline::{ExecutionBackend, ExecutionPipeline, PipelineConfig, PipelineError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Backend that prints canned lines and exits with a fixed result.
///
/// With `block_until_cancelled` set it waits for the cancellation token
/// after printing, like a long-running playbook.
pub struct ScriptedBackend {
    pub lines: Vec<String>,
    pub exit: SupervisedExit,
    pub block_until_cancelled: bool,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedBackend {
    pub fn exiting(code: i32, lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit: SupervisedExit::Exited(code),
            block_until_cancelled: false,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn blocking(lines: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            exit: SupervisedExit::Exited(0),
            block_until_cancelled: true,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn last_invocation(&self) -> Option<Invocation> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<SupervisedExit, PipelineError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        for line in &self.lines {
            let _ = output.send(line.clone());
        }
        if self.block_until_cancelled {
            cancel.cancelled().await;
            return Ok(SupervisedExit::Cancelled);
        }
        Ok(self.exit)
    }
}

/// Test harness: in-memory store, pipeline rooted in a temp dir.
pub struct Harness {
    pub pool: DbPool,
    pub pipeline: ExecutionPipeline,
    pub events: Arc<EventBus>,
    pub root: tempfile::TempDir,
}

pub fn harness(backend: Arc<dyn ExecutionBackend>) -> Harness {
    let root = tempfile::tempdir().expect("tempdir");
    let pool = create_pool();
    let events = Arc::new(EventBus::default());
    let mut config = PipelineConfig::new(root.path().join("projects"));
    config.hooks_dir = root.path().join("hooks");
    config.worker_concurrency = 2;
    let pipeline = ExecutionPipeline::new(pool.clone(), config, Arc::clone(&events), backend)
        .expect("pipeline");
    Harness {
        pool,
        pipeline,
        events,
        root,
    }
}

pub async fn manual_project(pool: &DbPool) -> DbId {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: "site".into(),
            ..Default::default()
        },
    )
    .await
    .expect("create project")
    .id
}

/// Poll a history entry until it leaves DELAY/RUN.
pub async fn wait_finished(pool: &DbPool, id: DbId) -> History {
    for _ in 0..200 {
        let entry = HistoryRepo::find_by_id(pool, id)
            .await
            .expect("lookup")
            .expect("history exists");
        if entry.status.is_terminal() {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history {id} did not finish");
}

/// Poll a history entry until it reaches `status`.
pub async fn wait_status(pool: &DbPool, id: DbId, status: HistoryStatus) -> History {
    for _ in 0..200 {
        let entry = HistoryRepo::find_by_id(pool, id)
            .await
            .expect("lookup")
            .expect("history exists");
        if entry.status == status {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history {id} never reached {status}");
}
