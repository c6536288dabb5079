//! Flattening of a deployment spec into schedulable steps.
//!
//! [`DeploymentSteps`] is the planner's view of a spec: the ordered list of
//! production steps (zone sets and delays), the test jobs the spec declares,
//! and the mapping from steps to concrete job types. Each production job is
//! emitted once even if its zone is declared twice.

use chrono::{DateTime, Duration, Utc};

use capstan_core::{DeploymentSpec, SpecStep, ZoneId};

use crate::application::Application;
use crate::jobs::JobType;

/// One schedulable production step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Hold the rollout for the given duration after the previous step.
    Delay(Duration),
    /// Deploy to the given zones concurrently, in declared order.
    Zones(Vec<ZoneId>),
}

/// The planner's view of one application's deployment spec.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentSteps<'a> {
    spec: &'a DeploymentSpec,
}

impl<'a> DeploymentSteps<'a> {
    /// Creates the view over the given spec.
    #[must_use]
    pub const fn of(spec: &'a DeploymentSpec) -> Self {
        Self { spec }
    }

    /// Returns the ordered steps that produce production jobs.
    ///
    /// Delay steps are kept in place; test stages are dropped. A zone
    /// declared more than once only appears in its first step.
    #[must_use]
    pub fn production(&self) -> Vec<Step> {
        let mut seen: Vec<ZoneId> = Vec::new();
        let mut steps = Vec::new();
        for step in self.spec.steps() {
            match step {
                SpecStep::SystemTest | SpecStep::StagingTest => {}
                SpecStep::Delay { .. } => {
                    if let Some(delay) = step.delay() {
                        steps.push(Step::Delay(delay));
                    }
                }
                SpecStep::Zone { zone } => {
                    if !seen.contains(zone) {
                        seen.push(zone.clone());
                        steps.push(Step::Zones(vec![zone.clone()]));
                    }
                }
                SpecStep::Parallel { zones } => {
                    let fresh: Vec<ZoneId> = zones
                        .iter()
                        .filter(|zone| !seen.contains(zone))
                        .cloned()
                        .collect();
                    seen.extend(fresh.iter().cloned());
                    if !fresh.is_empty() {
                        steps.push(Step::Zones(fresh));
                    }
                }
            }
        }
        steps
    }

    /// Returns the test jobs in pipeline order, when the spec declares tests.
    #[must_use]
    pub fn test_jobs(&self) -> Vec<JobType> {
        if self.spec.declares_tests() {
            vec![JobType::SystemTest, JobType::StagingTest]
        } else {
            Vec::new()
        }
    }

    /// Returns the job types a step produces; delay steps produce none.
    #[must_use]
    pub fn to_jobs(step: &Step) -> Vec<JobType> {
        match step {
            Step::Delay(_) => Vec::new(),
            Step::Zones(zones) => zones
                .iter()
                .map(|zone| JobType::Production(zone.clone()))
                .collect(),
        }
    }

    /// Returns when all member jobs of a zone step last succeeded.
    ///
    /// `None` when the step has a member without a success, or for delay
    /// steps, whose completion is the predecessor's completion plus the delay
    /// and is computed by the planner.
    #[must_use]
    pub fn completed_at(application: &Application, step: &Step) -> Option<DateTime<Utc>> {
        match step {
            Step::Delay(_) => None,
            Step::Zones(_) => Self::to_jobs(step)
                .iter()
                .map(|job_type| {
                    application
                        .deployment_jobs()
                        .status_of(job_type)
                        .and_then(|status| status.last_success())
                        .map(|run| run.at)
                })
                .collect::<Option<Vec<_>>>()?
                .into_iter()
                .max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use capstan_core::{ApplicationVersion, PlatformVersion};

    use crate::jobs::JobRun;
    use crate::versions::Versions;

    fn zone(region: &str) -> ZoneId {
        ZoneId::prod(region).unwrap()
    }

    fn spec() -> DeploymentSpec {
        DeploymentSpec::new(
            vec![
                SpecStep::SystemTest,
                SpecStep::StagingTest,
                SpecStep::Zone { zone: zone("us-east-1") },
                SpecStep::Delay { seconds: 3600 },
                SpecStep::Parallel {
                    zones: vec![zone("us-west-2"), zone("eu-west-1")],
                },
            ],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn production_keeps_order_and_delays() {
        let spec = spec();
        let steps = DeploymentSteps::of(&spec).production();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], Step::Zones(vec![zone("us-east-1")]));
        assert_eq!(steps[1], Step::Delay(Duration::hours(1)));
        assert_eq!(
            steps[2],
            Step::Zones(vec![zone("us-west-2"), zone("eu-west-1")])
        );
    }

    #[test]
    fn duplicate_zones_are_emitted_once() {
        let spec = DeploymentSpec::new(
            vec![
                SpecStep::Zone { zone: zone("us-east-1") },
                SpecStep::Parallel {
                    zones: vec![zone("us-east-1"), zone("eu-west-1")],
                },
            ],
            Vec::new(),
        )
        .unwrap();
        let steps = DeploymentSteps::of(&spec).production();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1], Step::Zones(vec![zone("eu-west-1")]));
    }

    #[test]
    fn test_jobs_follow_the_declaration() {
        let spec = spec();
        assert_eq!(
            DeploymentSteps::of(&spec).test_jobs(),
            vec![JobType::SystemTest, JobType::StagingTest]
        );

        let no_tests = DeploymentSpec::new(
            vec![SpecStep::Zone { zone: zone("us-east-1") }],
            Vec::new(),
        )
        .unwrap();
        assert!(DeploymentSteps::of(&no_tests).test_jobs().is_empty());
    }

    #[test]
    fn delay_steps_produce_no_jobs() {
        assert!(DeploymentSteps::to_jobs(&Step::Delay(Duration::hours(1))).is_empty());
        assert_eq!(
            DeploymentSteps::to_jobs(&Step::Zones(vec![zone("us-east-1")])).len(),
            1
        );
    }

    #[test]
    fn step_completion_is_the_max_member_success() {
        let spec = spec();
        let early = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let late = early + Duration::minutes(30);
        let versions =
            Versions::new(PlatformVersion::new(7, 3, 0), ApplicationVersion::unknown());

        let step = Step::Zones(vec![zone("us-west-2"), zone("eu-west-1")]);
        let mut app = crate::application::Application::new("acme.shop".parse().unwrap(), spec);
        assert_eq!(DeploymentSteps::completed_at(&app, &step), None);

        app = app.with_job_completion(
            JobType::Production(zone("us-west-2")),
            JobRun::completion(versions.clone(), "run", early, 1),
            None,
        );
        // One member still missing a success.
        assert_eq!(DeploymentSteps::completed_at(&app, &step), None);

        app = app.with_job_completion(
            JobType::Production(zone("eu-west-1")),
            JobRun::completion(versions, "run", late, 2),
            None,
        );
        assert_eq!(DeploymentSteps::completed_at(&app, &step), Some(late));
    }
}
