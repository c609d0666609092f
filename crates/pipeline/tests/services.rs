//! Project, template, periodic task and history services.

mod common;

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use chrono::Utc;
use common::{harness, manual_project, wait_finished, ScriptedBackend};
use helmsman_core::execution::InventoryRef;
use helmsman_core::history::{HistoryStatus, TRUNCATED_NOTICE};
use helmsman_core::hooks::HookWhen;
use helmsman_core::project::ProjectStatus;
use helmsman_core::schedule::{PeriodicKind, ScheduleType};
use helmsman_core::template::{TemplateData, TemplateKind};
use helmsman_db::models::periodic_task::CreatePeriodicTask;
use helmsman_db::models::project::CreateProject;
use helmsman_db::models::template::CreateTemplate;
use helmsman_db::repositories::{PeriodicTaskRepo, ProjectRepo};
use helmsman_pipeline::{
    HistoryService, PeriodicTaskService, PipelineError, ProjectService, TemplateService,
};

fn module_template() -> CreateTemplate {
    let mut options = BTreeMap::new();
    options.insert(
        "db".to_string(),
        TemplateData {
            group: Some("db".into()),
            ..Default::default()
        },
    );
    CreateTemplate {
        name: "ping".into(),
        kind: TemplateKind::Module,
        data: TemplateData {
            module: Some("ping".into()),
            group: Some("web".into()),
            inventory: Some(InventoryRef::Path("web1,db1".into())),
            vars: [("forks".to_string(), serde_json::json!(4))].into_iter().collect(),
            ..Default::default()
        },
        options,
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_project_sync_survives_missing_dir() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let service = ProjectService::new(h.pipeline.clone());
    let project = service
        .create(&CreateProject {
            name: "manual".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::New);

    let synced = service.sync(project.id).await.unwrap();
    assert_eq!(synced.status, ProjectStatus::Ok);
    assert_eq!(synced.revision.as_deref(), Some("NO VCS"));

    let dir = h.pipeline.config().project_dir(project.id);
    std::fs::remove_dir_all(&dir).unwrap();
    let synced = service.sync(project.id).await.unwrap();
    assert_eq!(synced.status, ProjectStatus::Ok);
    assert!(dir.is_dir());
}

#[tokio::test]
async fn project_crud_publishes_object_events() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let mut rx = h.events.subscribe();
    let service = ProjectService::new(h.pipeline.clone());

    let project = service
        .create(&CreateProject {
            name: "secret".into(),
            vars: [("repo_password".to_string(), "pw".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        })
        .await
        .unwrap();
    let added = rx.recv().await.unwrap();
    assert_eq!(added.when, HookWhen::OnObjectAdd);
    assert_eq!(added.source_entity_type.as_deref(), Some("project"));
    assert_eq!(added.payload["vars"]["repo_password"], "[~~ENCRYPTED~~]");

    service.clone_repository(project.id).await.unwrap();
    let dir = h.pipeline.config().project_dir(project.id);
    assert!(dir.is_dir());

    service.delete(project.id).await.unwrap();
    let deleted = rx.recv().await.unwrap();
    assert_eq!(deleted.when, HookWhen::OnObjectDel);
    assert!(!dir.exists());
    assert_matches!(
        service.get(project.id).await,
        Err(PipelineError::NotFound { entity: "project", .. })
    );
}

#[tokio::test]
async fn synced_project_lists_playbooks_and_readme() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let service = ProjectService::new(h.pipeline.clone());
    let project_id = manual_project(&h.pool).await;
    let dir = h.pipeline.config().project_dir(project_id);
    std::fs::create_dir_all(dir.join("roles")).unwrap();
    std::fs::write(dir.join("site.yml"), "---\n").unwrap();
    std::fs::write(dir.join("roles/main.yml"), "---\n").unwrap();
    std::fs::write(dir.join("README.md"), "# Site\n").unwrap();

    assert!(service.playbooks(project_id).await.unwrap().is_empty());
    service.sync(project_id).await.unwrap();

    let playbooks = service.playbooks(project_id).await.unwrap();
    assert_eq!(playbooks.len(), 1);
    assert_eq!(playbooks[0].name, "site");
    let readme = service.readme(project_id).await.unwrap().unwrap();
    assert_eq!(readme.format.ext(), ".md");
    assert_eq!(readme.content, "# Site\n");

    assert_matches!(
        service.playbooks(4242).await,
        Err(PipelineError::NotFound { entity: "project", .. })
    );
}

#[tokio::test]
async fn service_reads_mask_secrets() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let service = ProjectService::new(h.pipeline.clone());
    let project = service
        .create(&CreateProject {
            name: "secret".into(),
            vars: [("repo_password", "pw"), ("forks", "4")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(project.vars["repo_password"], "[~~ENCRYPTED~~]");

    let fetched = service.get(project.id).await.unwrap();
    assert_eq!(fetched.vars["repo_password"], "[~~ENCRYPTED~~]");
    assert_eq!(fetched.vars["forks"], "4");
    let synced = service.sync(project.id).await.unwrap();
    assert_eq!(synced.vars["repo_password"], "[~~ENCRYPTED~~]");

    let stored = ProjectRepo::find_by_id(&h.pool, project.id).await.unwrap().unwrap();
    assert_eq!(stored.vars["repo_password"], "pw");
}

#[tokio::test]
async fn unknown_repo_type_is_rejected_without_status_change() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let service = ProjectService::new(h.pipeline.clone());
    let project = service
        .create(&CreateProject {
            name: "svn".into(),
            vars: [("repo_type".to_string(), "SVN".to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_matches!(service.sync(project.id).await, Err(PipelineError::Sync(_)));
    let project = ProjectRepo::find_by_id(&h.pool, project.id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::New);
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn template_execution_records_origin() {
    let backend = ScriptedBackend::exiting(0, &[]);
    let h = harness(backend.clone());
    let project_id = manual_project(&h.pool).await;
    let service = TemplateService::new(h.pipeline.clone());
    let template = service.create(project_id, &module_template()).await.unwrap();

    let id = service.execute(template.id, Some("db")).await.unwrap();
    let entry = wait_finished(&h.pool, id).await;

    assert_eq!(entry.status, HistoryStatus::Ok);
    assert_eq!(entry.initiator_type, "template");
    assert_eq!(entry.initiator, Some(template.id));
    assert_eq!(entry.options["template_option"], "db");
    assert_eq!(entry.options["group"], "db");
    let args = backend.last_invocation().unwrap().args;
    assert_eq!(args[0], "db");
    assert!(args.windows(2).any(|w| w == ["--forks", "4"]));
}

#[tokio::test]
async fn template_expand_and_unknown_option() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let project_id = manual_project(&h.pool).await;
    let service = TemplateService::new(h.pipeline.clone());
    let template = service.create(project_id, &module_template()).await.unwrap();

    let request = service.expand(template.id, None).await.unwrap();
    assert_eq!(request.target, "ping");
    assert_eq!(request.group, "web");

    assert_matches!(
        service.execute(template.id, Some("missing")).await,
        Err(PipelineError::Validation(_))
    );
    assert!(service.options_view(template.id).await.unwrap().contains_key("db"));
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn execute_now_reports_inventory() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let project_id = manual_project(&h.pool).await;
    let service = PeriodicTaskService::new(h.pipeline.clone());
    let task = service
        .create(
            project_id,
            &CreatePeriodicTask {
                name: "nightly".into(),
                kind: PeriodicKind::Playbook,
                mode: "site.yml".into(),
                inventory: Some(InventoryRef::Path("web1,web2".into())),
                schedule: "0 3 * * *".into(),
                schedule_type: ScheduleType::Crontab,
                template_id: None,
                template_option: None,
                vars: Default::default(),
                enabled: true,
            },
        )
        .await
        .unwrap();

    let (id, message) = service.execute_now(task.id).await.unwrap();
    assert_eq!(message, "Started at inventory web1,web2.");
    let entry = wait_finished(&h.pool, id).await;
    assert_eq!(entry.initiator_type, "scheduler");
    assert_eq!(entry.initiator, Some(task.id));
}

#[tokio::test]
async fn module_task_runs_with_stored_group_and_args() {
    let backend = ScriptedBackend::exiting(0, &[]);
    let h = harness(backend.clone());
    let project_id = manual_project(&h.pool).await;
    let service = PeriodicTaskService::new(h.pipeline.clone());
    let task = service
        .create(
            project_id,
            &CreatePeriodicTask {
                name: "disk".into(),
                kind: PeriodicKind::Module,
                mode: "shell".into(),
                inventory: Some(InventoryRef::Path("web1,web2".into())),
                schedule: "60".into(),
                schedule_type: ScheduleType::Interval,
                template_id: None,
                template_option: None,
                vars: [("group", "web1"), ("args", "df -h"), ("forks", "2")]
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                enabled: true,
            },
        )
        .await
        .unwrap();

    let (id, _) = service.run_task(&task).await.unwrap();
    let entry = wait_finished(&h.pool, id).await;
    assert_eq!(entry.status, HistoryStatus::Ok);
    assert_eq!(entry.options["group"], "web1");
    assert_eq!(entry.options["args"], "df -h");
    assert_eq!(
        backend.last_invocation().unwrap().args,
        vec!["web1", "-i", "web1,web2,", "-m", "shell", "-a", "df -h", "--forks", "2"]
    );
}

#[tokio::test]
async fn template_task_overrides_template_vars() {
    let backend = ScriptedBackend::exiting(0, &[]);
    let h = harness(backend.clone());
    let project_id = manual_project(&h.pool).await;
    let template = TemplateService::new(h.pipeline.clone())
        .create(project_id, &module_template())
        .await
        .unwrap();
    let service = PeriodicTaskService::new(h.pipeline.clone());
    let task = service
        .create(
            project_id,
            &CreatePeriodicTask {
                name: "ping-db".into(),
                kind: PeriodicKind::Template,
                mode: String::new(),
                inventory: None,
                schedule: "60".into(),
                schedule_type: ScheduleType::Interval,
                template_id: Some(template.id),
                template_option: Some("db".into()),
                vars: [("forks".to_string(), "9".to_string())].into_iter().collect(),
                enabled: true,
            },
        )
        .await
        .unwrap();

    let (id, inventory) = service.run_task(&task).await.unwrap();
    assert_eq!(inventory, InventoryRef::Path("web1,db1".into()));
    let entry = wait_finished(&h.pool, id).await;
    assert_eq!(entry.options["template_option"], "db");
    let args = backend.last_invocation().unwrap().args;
    assert!(args.windows(2).any(|w| w == ["--forks", "9"]));
}

#[tokio::test]
async fn due_tasks_follow_schedule_and_enabled_flag() {
    let h = harness(ScriptedBackend::exiting(0, &[]));
    let project_id = manual_project(&h.pool).await;
    let service = PeriodicTaskService::new(h.pipeline.clone());
    let interval = |name: &str, enabled: bool| CreatePeriodicTask {
        name: name.into(),
        kind: PeriodicKind::Module,
        mode: "ping".into(),
        inventory: Some(InventoryRef::Path("web1".into())),
        schedule: "300".into(),
        schedule_type: ScheduleType::Interval,
        template_id: None,
        template_option: None,
        vars: Default::default(),
        enabled,
    };
    let on = service.create(project_id, &interval("on", true)).await.unwrap();
    service.create(project_id, &interval("off", false)).await.unwrap();

    let now = Utc::now();
    let due = service.due_tasks(now).await.unwrap();
    assert_eq!(due.iter().map(|t| t.id).collect::<Vec<_>>(), vec![on.id]);

    PeriodicTaskRepo::set_last_run(&h.pool, on.id, now).await.unwrap();
    assert!(service.due_tasks(now).await.unwrap().is_empty());
    assert_eq!(
        service
            .due_tasks(now + chrono::Duration::seconds(300))
            .await
            .unwrap()
            .len(),
        1
    );
}

// ---------------------------------------------------------------------------
// History views
// ---------------------------------------------------------------------------

#[tokio::test]
async fn facts_raw_and_clear_views() {
    let h = harness(ScriptedBackend::exiting(
        0,
        &["\x1b[0;32mweb1 | SUCCESS => {", "    \"ping\": \"pong\"", "}\x1b[0m"],
    ));
    let project_id = manual_project(&h.pool).await;
    let id = ProjectService::new(h.pipeline.clone())
        .execute(
            project_id,
            helmsman_core::execution::ExecutionRequest::module(
                "ping",
                InventoryRef::Path("web1".into()),
            ),
        )
        .await
        .unwrap();
    wait_finished(&h.pool, id).await;

    let facts = HistoryService::facts(&h.pool, id).await.unwrap();
    assert_eq!(facts["web1"]["ping"], "pong");
    assert_eq!(facts["web1"]["status"], "SUCCESS");

    let raw = HistoryService::raw(&h.pool, id, false).await.unwrap();
    assert!(raw.starts_with("web1 | SUCCESS => {"));
    assert!(HistoryService::raw(&h.pool, id, true)
        .await
        .unwrap()
        .contains("\x1b[0;32m"));

    HistoryService::clear(&h.pool, id).await.unwrap();
    assert_eq!(
        HistoryService::raw(&h.pool, id, false).await.unwrap(),
        TRUNCATED_NOTICE
    );
}
