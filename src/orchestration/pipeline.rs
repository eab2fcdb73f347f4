//! Sequential pipeline runner.

use super::context::PipelineContext;
use crate::constants::Lifecycle;
use crate::error::ProvisionResult;
use crate::logging::{log_error, log_step_operation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// One named unit of the pipeline.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Stable identifier used in logs and records
    fn name(&self) -> &'static str;

    /// Human readable progress line
    fn title(&self) -> &'static str;

    async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

/// What happened to one step of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

impl StepRecord {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StepState::Pending,
            started_at: None,
            duration: None,
            error: None,
        }
    }
}

/// An ordered list of steps for one lifecycle, with the context they share.
pub struct PipelineRun {
    run_id: Uuid,
    lifecycle: Lifecycle,
    steps: Vec<Box<dyn PipelineStep>>,
    context: PipelineContext,
    records: Vec<StepRecord>,
}

impl PipelineRun {
    pub fn new(
        lifecycle: Lifecycle,
        steps: Vec<Box<dyn PipelineStep>>,
        context: PipelineContext,
    ) -> Self {
        let records = steps.iter().map(|s| StepRecord::pending(s.name())).collect();
        Self {
            run_id: Uuid::new_v4(),
            lifecycle,
            steps,
            context,
            records,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn into_context(self) -> PipelineContext {
        self.context
    }

    /// Execute every step in order. The first failing step stops the run;
    /// later steps stay `Pending` and nothing already provisioned is undone.
    pub async fn run(&mut self) -> ProvisionResult<()> {
        let run_id = self.run_id.to_string();
        let count = self.steps.len();
        info!(run_id = %run_id, lifecycle = %self.lifecycle, steps = count, "🎬 Pipeline started");

        for (index, step) in self.steps.iter().enumerate() {
            let position = index + 1;
            let record = &mut self.records[index];
            record.state = StepState::InProgress;
            record.started_at = Some(Utc::now());
            info!("[{position}/{count}]: {}", step.title());
            log_step_operation(&run_id, position, count, step.name(), "in_progress", None);

            let started = Instant::now();
            let outcome = step.execute(&mut self.context).await;
            record.duration = Some(started.elapsed());

            match outcome {
                Ok(()) => {
                    record.state = StepState::Complete;
                    log_step_operation(&run_id, position, count, step.name(), "complete", None);
                }
                Err(error) => {
                    let message = error.to_string();
                    record.state = StepState::Error;
                    record.error = Some(message.clone());
                    log_step_operation(
                        &run_id,
                        position,
                        count,
                        step.name(),
                        "error",
                        Some(&message),
                    );
                    log_error(
                        "pipeline",
                        step.name(),
                        &message,
                        Some(&format!("category={}", error.category())),
                    );
                    return Err(error);
                }
            }
        }

        info!(run_id = %run_id, lifecycle = %self.lifecycle, "🏁 Pipeline finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl PipelineStep for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        fn title(&self) -> &'static str {
            "Recording step"
        }

        async fn execute(&self, context: &mut PipelineContext) -> ProvisionResult<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(ProvisionError::MissingContext {
                    step: self.name.to_string(),
                    key: "anything".to_string(),
                });
            }
            context.set(self.name, true);
            Ok(())
        }
    }

    fn steps(
        log: &Arc<Mutex<Vec<&'static str>>>,
        spec: &[(&'static str, bool)],
    ) -> Vec<Box<dyn PipelineStep>> {
        spec.iter()
            .map(|&(name, fail)| {
                Box::new(Recording {
                    name,
                    log: log.clone(),
                    fail,
                }) as Box<dyn PipelineStep>
            })
            .collect()
    }

    #[tokio::test]
    async fn steps_run_in_order_and_share_context() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut run = PipelineRun::new(
            Lifecycle::Create,
            steps(&log, &[("a", false), ("b", false), ("c", false)]),
            PipelineContext::new(),
        );

        run.run().await.unwrap();

        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
        assert!(run.records().iter().all(|r| r.state == StepState::Complete));
        assert!(run.records().iter().all(|r| r.duration.is_some()));
        assert_eq!(run.context().get("b"), Some(&serde_json::Value::Bool(true)));
    }

    #[tokio::test]
    async fn first_failure_aborts_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut run = PipelineRun::new(
            Lifecycle::Update,
            steps(&log, &[("a", false), ("b", true), ("c", false)]),
            PipelineContext::new(),
        );

        let err = run.run().await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingContext { .. }));

        assert_eq!(*log.lock().unwrap(), ["a", "b"]);
        let states: Vec<_> = run.records().iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            [StepState::Complete, StepState::Error, StepState::Pending]
        );
        assert!(run.records()[1].error.is_some());
    }

    #[test]
    fn step_state_round_trips_through_strings() {
        for state in [
            StepState::Pending,
            StepState::InProgress,
            StepState::Complete,
            StepState::Error,
        ] {
            assert_eq!(state.to_string().parse::<StepState>().unwrap(), state);
        }
        assert!("done".parse::<StepState>().is_err());
        assert!(StepState::Error.is_terminal());
        assert!(!StepState::InProgress.is_terminal());
    }
}
