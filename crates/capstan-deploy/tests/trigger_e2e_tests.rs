//! End-to-end scenarios for the deployment trigger.
//!
//! Each test drives the full loop: external change requests, ready-jobs
//! sweeps, and completion reports, against the in-memory store and build
//! service with a manual clock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use capstan_core::{
    ApplicationId, ApplicationVersion, Change, DeploymentSpec, ManualClock, PlatformVersion,
    ProjectId, SourceRevision, SpecStep, ZoneId,
};
use capstan_deploy::application::{Application, Deployment};
use capstan_deploy::build::memory::InMemoryBuildService;
use capstan_deploy::config::{SystemName, TriggerConfig};
use capstan_deploy::jobs::{JobError, JobReport, JobType};
use capstan_deploy::store::memory::InMemoryApplicationStore;
use capstan_deploy::store::ApplicationStore;
use capstan_deploy::trigger::DeploymentTrigger;

const SYSTEM_VERSION: PlatformVersion = PlatformVersion::new(7, 3, 0);

struct Harness {
    store: Arc<InMemoryApplicationStore>,
    build: Arc<InMemoryBuildService>,
    clock: ManualClock,
    trigger: DeploymentTrigger,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryApplicationStore::new());
    let build = Arc::new(InMemoryBuildService::new());
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap());
    let trigger = DeploymentTrigger::new(
        store.clone(),
        build.clone(),
        Arc::new(clock.clone()),
        TriggerConfig::for_system(SystemName::Main),
        SYSTEM_VERSION,
    );
    Harness {
        store,
        build,
        clock,
        trigger,
    }
}

fn zone(region: &str) -> ZoneId {
    ZoneId::prod(region).unwrap()
}

fn single_zone_spec() -> DeploymentSpec {
    DeploymentSpec::new(
        vec![
            SpecStep::SystemTest,
            SpecStep::StagingTest,
            SpecStep::Zone { zone: zone("us-east-1") },
        ],
        Vec::new(),
    )
    .unwrap()
}

async fn create_application(harness: &Harness, id: &str, project: u64) -> ApplicationId {
    let id: ApplicationId = id.parse().unwrap();
    harness
        .store
        .create(
            Application::new(id.clone(), single_zone_spec())
                .with_project_id(ProjectId::new(project)),
        )
        .await
        .unwrap();
    id
}

fn success_report(id: &ApplicationId, project: u64, job_type: JobType, build: u64) -> JobReport {
    JobReport {
        application_id: id.clone(),
        project_id: ProjectId::new(project),
        job_type,
        build_number: build,
        source_revision: None,
        error: None,
    }
}

#[tokio::test]
async fn fresh_upgrade_walks_the_pipeline() {
    let h = harness();
    let id = create_application(&h, "acme.shop", 101).await;

    h.trigger
        .trigger_change(&id, Change::of_platform(SYSTEM_VERSION))
        .await
        .unwrap();

    // Tick: exactly one job, the system test, targeting {7.3, unknown}.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    assert_eq!(h.build.job_names_for(&id), ["system-test"]);
    let stored = h.store.require(&id).await.unwrap();
    let triggered = stored
        .deployment_jobs()
        .status_of(&JobType::SystemTest)
        .unwrap()
        .last_triggered()
        .unwrap();
    assert_eq!(triggered.versions.target_platform, SYSTEM_VERSION);
    assert!(triggered.versions.target_application.is_unknown());

    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(&id, 101, JobType::SystemTest, 1))
        .await
        .unwrap();

    // Tick: exactly the staging test.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    assert_eq!(h.build.job_names_for(&id), ["system-test", "staging-test"]);

    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(&id, 101, JobType::StagingTest, 1))
        .await
        .unwrap();

    // Tick: exactly the production zone.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    assert_eq!(
        h.build.job_names_for(&id),
        ["system-test", "staging-test", "production-us-east-1"]
    );

    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(
            &id,
            101,
            JobType::Production(zone("us-east-1")),
            1,
        ))
        .await
        .unwrap();

    // Tick: nothing left; the change is complete.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 0);
    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.change(), &Change::empty());
}

#[tokio::test]
async fn out_of_capacity_retry_respects_the_pause() {
    let h = harness();
    let id = create_application(&h, "acme.shop", 101).await;
    h.trigger
        .trigger_change(&id, Change::of_platform(SYSTEM_VERSION))
        .await
        .unwrap();
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);

    h.clock.advance(Duration::minutes(2));
    h.trigger
        .notify_of_completion(&JobReport {
            error: Some(JobError::OutOfCapacity),
            ..success_report(&id, 101, JobType::SystemTest, 1)
        })
        .await
        .unwrap();

    // 45 seconds after the out-of-capacity completion: no retry yet.
    h.clock.advance(Duration::seconds(45));
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 0);

    // Past the minute: exactly one retry.
    h.clock.advance(Duration::seconds(16));
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    assert_eq!(h.build.job_names_for(&id), ["system-test", "system-test"]);
}

#[tokio::test]
async fn production_zones_are_not_downgraded() {
    let h = harness();
    let id: ApplicationId = "acme.shop".parse().unwrap();
    h.store
        .create(
            Application::new(id.clone(), single_zone_spec())
                .with_project_id(ProjectId::new(101))
                .with_deployment(
                    zone("us-east-1"),
                    Deployment::new(
                        PlatformVersion::new(8, 0, 0),
                        ApplicationVersion::unknown(),
                        Utc.with_ymd_and_hms(2026, 1, 4, 12, 0, 0).unwrap(),
                    ),
                ),
        )
        .await
        .unwrap();

    h.trigger
        .trigger_change(&id, Change::of_platform(PlatformVersion::new(7, 0, 0)))
        .await
        .unwrap();

    h.trigger.trigger_ready_jobs().await.unwrap();
    assert!(h
        .build
        .job_names_for(&id)
        .iter()
        .all(|name| !name.starts_with("production")));
}

#[tokio::test]
async fn healthy_change_rejects_a_second_change() {
    let h = harness();
    let id = create_application(&h, "acme.shop", 101).await;

    h.trigger
        .trigger_change(&id, Change::of_platform(SYSTEM_VERSION))
        .await
        .unwrap();
    let second = h
        .trigger
        .trigger_change(&id, Change::of_platform(PlatformVersion::new(7, 4, 0)))
        .await;
    assert!(matches!(
        second,
        Err(capstan_deploy::error::Error::ChangeConflict { .. })
    ));

    // A failing pipeline may be superseded.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    h.clock.advance(Duration::minutes(1));
    h.trigger
        .notify_of_completion(&JobReport {
            error: Some(JobError::TestFailure),
            ..success_report(&id, 101, JobType::SystemTest, 1)
        })
        .await
        .unwrap();
    h.trigger
        .trigger_change(&id, Change::of_platform(PlatformVersion::new(7, 4, 0)))
        .await
        .unwrap();
    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(
        stored.change(),
        &Change::of_platform(PlatformVersion::new(7, 4, 0))
    );
}

#[tokio::test]
async fn test_capacity_is_rate_limited_production_is_not() {
    let h = harness();

    // Fifty applications all ready to run the system test.
    for i in 0..50 {
        let id = create_application(&h, &format!("acme.shop-{i}"), 100 + i).await;
        h.trigger
            .trigger_change(&id, Change::of_platform(SYSTEM_VERSION))
            .await
            .unwrap();
    }

    // Three applications ready for independent production deployments.
    let mut production_ids = Vec::new();
    for i in 0..3 {
        let id: ApplicationId = format!("prodco.app-{i}").parse().unwrap();
        let mut application = Application::new(id.clone(), single_zone_spec())
            .with_project_id(ProjectId::new(200 + i))
            .with_change(Change::of_platform(SYSTEM_VERSION));
        let versions = capstan_deploy::versions::Versions::from(
            application.change(),
            &application,
            None,
            &SYSTEM_VERSION,
        );
        let tested_at = Utc.with_ymd_and_hms(2026, 1, 5, 11, 0, 0).unwrap();
        application = application
            .with_job_completion(
                JobType::SystemTest,
                capstan_deploy::jobs::JobRun::completion(versions.clone(), "test", tested_at, 1),
                None,
            )
            .with_job_completion(
                JobType::StagingTest,
                capstan_deploy::jobs::JobRun::completion(versions, "test", tested_at, 1),
                None,
            );
        h.store.create(application).await.unwrap();
        production_ids.push(id);
    }

    // One pass: exactly one system test, all three production jobs.
    let dispatched = h.trigger.trigger_ready_jobs().await.unwrap();
    assert_eq!(dispatched, 4);

    let triggered = h.build.triggered_jobs();
    let system_tests = triggered
        .iter()
        .filter(|job| job.job_name == "system-test")
        .count();
    assert_eq!(system_tests, 1);
    for id in &production_ids {
        assert_eq!(h.build.job_names_for(id), ["production-us-east-1"]);
    }
}

#[tokio::test]
async fn capacity_lane_prefers_retries() {
    let h = harness();

    let fresh = create_application(&h, "acme.fresh", 101).await;
    h.trigger
        .trigger_change(&fresh, Change::of_platform(SYSTEM_VERSION))
        .await
        .unwrap();

    // A second application whose system test failed on capacity earlier.
    let retrying: ApplicationId = "acme.retrying".parse().unwrap();
    let mut application = Application::new(retrying.clone(), single_zone_spec())
        .with_project_id(ProjectId::new(102))
        .with_change(Change::of_platform(SYSTEM_VERSION));
    let versions = capstan_deploy::versions::Versions::from(
        application.change(),
        &application,
        None,
        &SYSTEM_VERSION,
    );
    let failed_at = Utc.with_ymd_and_hms(2026, 1, 5, 11, 58, 0).unwrap();
    application = application.with_job_completion(
        JobType::SystemTest,
        capstan_deploy::jobs::JobRun::completion(versions, "test", failed_at, 1),
        Some(JobError::OutOfCapacity),
    );
    h.store.create(application).await.unwrap();

    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    assert!(h.build.job_names_for(&fresh).is_empty());
    assert_eq!(h.build.job_names_for(&retrying), ["system-test"]);
}

#[tokio::test]
async fn component_build_parks_behind_a_platform_upgrade() {
    let h = harness();
    let id = create_application(&h, "acme.shop", 101).await;

    h.trigger
        .trigger_change(&id, Change::of_platform(SYSTEM_VERSION))
        .await
        .unwrap();
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(&id, 101, JobType::SystemTest, 1))
        .await
        .unwrap();

    // A component build lands mid-upgrade.
    let built = ApplicationVersion::from(SourceRevision::new("repo", "main", "3b5c9e1aa"), 42);
    h.trigger
        .notify_of_completion(&JobReport {
            source_revision: Some(SourceRevision::new("repo", "main", "3b5c9e1aa")),
            ..success_report(&id, 101, JobType::Component, 42)
        })
        .await
        .unwrap();

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.change(), &Change::of_platform(SYSTEM_VERSION));
    assert_eq!(
        stored.outstanding_change(),
        &Change::of_application(built.clone())
    );

    // Finish the platform upgrade.
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(&id, 101, JobType::StagingTest, 1))
        .await
        .unwrap();
    assert_eq!(h.trigger.trigger_ready_jobs().await.unwrap(), 1);
    h.clock.advance(Duration::minutes(5));
    h.trigger
        .notify_of_completion(&success_report(
            &id,
            101,
            JobType::Production(zone("us-east-1")),
            1,
        ))
        .await
        .unwrap();

    // The platform change is done; the built version takes its place.
    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.change(), &Change::of_application(built));
    assert_eq!(stored.outstanding_change(), &Change::empty());
}

#[tokio::test]
async fn component_build_joins_an_idle_application() {
    let h = harness();
    let id = create_application(&h, "acme.shop", 101).await;

    let built = ApplicationVersion::from(SourceRevision::new("repo", "main", "99ac00b21"), 7);
    h.trigger
        .notify_of_completion(&JobReport {
            source_revision: Some(SourceRevision::new("repo", "main", "99ac00b21")),
            ..success_report(&id, 101, JobType::Component, 7)
        })
        .await
        .unwrap();

    let stored = h.store.require(&id).await.unwrap();
    assert_eq!(stored.change(), &Change::of_application(built));
    assert_eq!(stored.outstanding_change(), &Change::empty());
}
