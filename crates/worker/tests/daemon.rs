//! Scheduler and seed loading against an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use helmsman_core::history::HistoryStatus;
use helmsman_core::scripting::subprocess::SupervisedExit;
use helmsman_db::create_pool;
use helmsman_core::execution::InventoryRef;
use helmsman_core::schedule::{PeriodicKind, ScheduleType};
use helmsman_db::models::periodic_task::CreatePeriodicTask;
use helmsman_db::models::project::CreateProject;
use helmsman_db::repositories::{
    HistoryRepo, HookRepo, InventoryRepo, PeriodicTaskRepo, ProjectRepo, TemplateRepo,
};
use helmsman_events::EventBus;
use helmsman_pipeline::invocation::Invocation;
use helmsman_pipeline::{
    ExecutionBackend, ExecutionPipeline, PeriodicTaskService, PipelineConfig, PipelineError,
};
use helmsman_worker::background::scheduler;
use helmsman_worker::seed::{self, Seed, SeedSummary};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

struct Succeeds;

#[async_trait]
impl ExecutionBackend for Succeeds {
    async fn run(
        &self,
        _invocation: &Invocation,
        _cancel: &CancellationToken,
        output: mpsc::UnboundedSender<String>,
    ) -> Result<SupervisedExit, PipelineError> {
        let _ = output.send("ok".to_string());
        Ok(SupervisedExit::Exited(0))
    }
}

fn pipeline(root: &std::path::Path) -> ExecutionPipeline {
    ExecutionPipeline::new(
        create_pool(),
        PipelineConfig::new(root.join("projects")),
        Arc::new(EventBus::default()),
        Arc::new(Succeeds),
    )
    .expect("pipeline")
}

const SEED: &str = r#"{
  "hooks": [
    {"name": "audit", "hook_type": "HTTP",
     "recipients": ["http://127.0.0.1:9/hook"], "when": "after_execution"}
  ],
  "projects": [{
    "name": "site",
    "sync": true,
    "hosts": [{"name": "web1"}, {"name": "web2", "vars": {"ansible_user": "deploy"}}],
    "inventories": [{"name": "prod", "hosts": ["web1", "web2"]}],
    "templates": [
      {"name": "ping", "kind": "MODULE",
       "data": {"module": "ping", "inventory": "web1,"},
       "options": {"db": {"group": "db"}}}
    ],
    "periodic_tasks": [
      {"name": "ping-every-minute", "kind": "TEMPLATE", "template": "ping",
       "schedule": "60", "schedule_type": "INTERVAL"},
      {"name": "nightly", "kind": "PLAYBOOK", "mode": "site.yml",
       "inventory_name": "prod", "schedule": "0 3 * * *", "schedule_type": "CRONTAB"}
    ]
  }]
}"#;

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seed_creates_everything_by_name() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline(root.path());
    let seed: Seed = serde_json::from_str(SEED).unwrap();

    let summary = seed::apply(&pipeline, seed).await.unwrap();
    assert_eq!(
        summary,
        SeedSummary {
            hooks: 1,
            projects: 1,
            templates: 1,
            periodic_tasks: 2,
        }
    );

    let pool = pipeline.pool();
    assert_eq!(HookRepo::list(pool).await.unwrap().len(), 1);
    let project = &ProjectRepo::list(pool).await.unwrap()[0];
    assert_eq!(project.revision.as_deref(), Some("NO VCS"));

    let inventories = InventoryRepo::list_by_project(pool, project.id).await.unwrap();
    assert_eq!(inventories[0].hosts.len(), 2);

    let template = &TemplateRepo::list_by_project(pool, project.id).await.unwrap()[0];
    let tasks = PeriodicTaskRepo::list_by_project(pool, project.id).await.unwrap();
    let by_template = tasks.iter().find(|t| t.name == "ping-every-minute").unwrap();
    assert_eq!(by_template.template_id, Some(template.id));
    let nightly = tasks.iter().find(|t| t.name == "nightly").unwrap();
    assert_eq!(
        nightly.inventory,
        Some(helmsman_core::execution::InventoryRef::Stored(inventories[0].id))
    );
}

#[tokio::test]
async fn seed_rejects_unknown_references() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline(root.path());
    let seed: Seed = serde_json::from_str(
        r#"{"projects": [{"name": "site",
             "inventories": [{"name": "prod", "hosts": ["ghost"]}]}]}"#,
    )
    .unwrap();

    let err = seed::apply(&pipeline, seed).await.unwrap_err();
    assert!(err.to_string().contains("unknown host 'ghost'"));
}

#[tokio::test]
async fn seed_file_errors_name_the_file() {
    let root = tempfile::tempdir().unwrap();
    let path = root.path().join("seed.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = seed::load_file(&path).await.unwrap_err();
    assert!(err.to_string().contains("seed.json"));
    assert_matches!(seed::load_file(&root.path().join("missing.json")).await, Err(_));
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn due_tasks_launch_once_per_interval() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline(root.path());
    seed::apply(&pipeline, serde_json::from_str(SEED).unwrap())
        .await
        .unwrap();
    let service = PeriodicTaskService::new(pipeline.clone());

    // The interval task has never run; the nightly cron task is not due
    // unless the test happens to run at 03:00.
    let launches = TaskTracker::new();
    let launched = scheduler::run_due(&service, &launches).await;
    assert!(launched >= 1);
    launches.close();
    launches.wait().await;

    let project = &ProjectRepo::list(pipeline.pool()).await.unwrap()[0];
    let mut entries = Vec::new();
    for _ in 0..200 {
        entries = HistoryRepo::list_by_project(pipeline.pool(), project.id)
            .await
            .unwrap();
        if entries.iter().all(|e| e.status.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let scheduled = entries
        .iter()
        .find(|e| e.mode == "ping")
        .expect("template task ran");
    assert_eq!(scheduled.initiator_type, "scheduler");
    assert_eq!(scheduled.status, HistoryStatus::Ok);

    // Stamped, so the next immediate tick has nothing from the interval task.
    let tasks = PeriodicTaskRepo::list_by_project(pipeline.pool(), project.id)
        .await
        .unwrap();
    assert!(tasks
        .iter()
        .find(|t| t.name == "ping-every-minute")
        .unwrap()
        .last_run
        .is_some());
    let again = service
        .due_tasks(chrono::Utc::now())
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.name == "ping-every-minute")
        .count();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn scheduler_loop_stops_on_cancel() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline(root.path());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler::run(
        PeriodicTaskService::new(pipeline.clone()),
        Duration::from_millis(20),
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler stopped")
        .unwrap();
}

#[tokio::test]
async fn slow_sync_does_not_hold_up_the_tick() {
    let root = tempfile::tempdir().unwrap();
    let pipeline = pipeline(root.path());
    let pool = pipeline.pool();

    // Accepts connections and never answers, like a stalled archive server.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let stalled = ProjectRepo::create(
        pool,
        &CreateProject {
            name: "stalled".into(),
            repository: format!("http://{addr}/site.tar.gz"),
            vars: [("repo_type", "TAR"), ("repo_sync_on_run", "true")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
    )
    .await
    .unwrap();
    let manual = ProjectRepo::create(
        pool,
        &CreateProject {
            name: "manual".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    for project_id in [stalled.id, manual.id] {
        PeriodicTaskRepo::create(
            pool,
            project_id,
            &CreatePeriodicTask {
                name: "ping".into(),
                kind: PeriodicKind::Module,
                mode: "ping".into(),
                inventory: Some(InventoryRef::Path("localhost".into())),
                schedule: "60".into(),
                schedule_type: ScheduleType::Interval,
                template_id: None,
                template_option: None,
                vars: Default::default(),
                enabled: true,
            },
        )
        .await
        .unwrap();
    }

    let service = PeriodicTaskService::new(pipeline.clone());
    let launches = TaskTracker::new();
    let launched = tokio::time::timeout(
        Duration::from_secs(2),
        scheduler::run_due(&service, &launches),
    )
    .await
    .expect("tick returns while a sync hangs");
    assert_eq!(launched, 2);

    let mut finished = None;
    for _ in 0..200 {
        let entries = HistoryRepo::list_by_project(pool, manual.id).await.unwrap();
        if let Some(entry) = entries.into_iter().find(|e| e.status.is_terminal()) {
            finished = Some(entry);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finished.expect("manual task ran").status, HistoryStatus::Ok);
}
