//! PlanRunner - executes plan steps in order and rolls them back in reverse

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::{StepExecutionError, StepPhase};
use crate::actions::{ActionContext, ActionExecutor};
use crate::config::ExecutorConfig;
use crate::domain::{AuditEvent, AuditKind, Plan, PlanError, PlanStatus, StepStatus};
use crate::events::{AuditLog, EventBus};

/// Runner settings
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub step_timeout: Option<Duration>,
    pub rollback_on_failure: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for RunnerConfig {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            step_timeout: config.step_timeout_ms.map(Duration::from_millis),
            rollback_on_failure: config.rollback_on_failure,
        }
    }
}

/// Outcome of [`PlanRunner::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub plan_id: String,
    pub status: PlanStatus,
    /// IDs of steps that succeeded, in execution order
    pub completed: Vec<String>,
    /// The step failure that stopped the run
    pub failure: Option<StepExecutionError>,
    /// Present when the runner rolled back after a failure
    pub rollback: Option<RollbackReport>,
}

/// Outcome of [`PlanRunner::rollback`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RollbackReport {
    pub plan_id: String,
    /// IDs of steps undone, in undo (reverse) order
    pub undone: Vec<String>,
    pub failures: Vec<StepExecutionError>,
}

impl RollbackReport {
    /// True when there was nothing to undo
    pub fn is_noop(&self) -> bool {
        self.undone.is_empty() && self.failures.is_empty()
    }
}

/// Executes plans against the clinic
///
/// The runner only does bookkeeping; every clinic change goes through the
/// [`ActionExecutor`].
pub struct PlanRunner {
    executor: Arc<ActionExecutor>,
    ctx: ActionContext,
    events: Arc<EventBus>,
    audit: AuditLog,
    config: RunnerConfig,
}

impl PlanRunner {
    pub fn new(
        executor: Arc<ActionExecutor>,
        ctx: ActionContext,
        events: Arc<EventBus>,
        audit: AuditLog,
        config: RunnerConfig,
    ) -> Self {
        debug!(?config, "PlanRunner::new: called");
        Self {
            executor,
            ctx,
            events,
            audit,
            config,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Run every step in declared order, stopping at the first failure
    pub async fn run(&self, plan: &mut Plan) -> Result<RunReport, PlanError> {
        debug!(plan_id = %plan.id, step_count = plan.steps.len(), "PlanRunner::run: called");
        if plan.needs_clarification() {
            debug!("PlanRunner::run: plan needs clarification");
            return Err(PlanError::NeedsClarification {
                plan_id: plan.id.clone(),
            });
        }

        plan.set_status(PlanStatus::Running)?;
        info!("Running plan {} ({} steps)", plan.id, plan.steps.len());

        let emitter = self.events.emitter_for(&plan.id);
        let ctx = self.ctx.for_plan(&plan.id);
        emitter.plan_started(plan.steps.len());

        let mut completed = Vec::new();
        let mut failure = None;

        for step in plan.steps.iter_mut() {
            debug!(step_id = %step.id, label = %step.label, "PlanRunner::run: executing step");
            match self
                .executor
                .execute_with_timeout(&step.action, &ctx, self.config.step_timeout)
                .await
            {
                Ok(outcome) => {
                    step.status = StepStatus::Succeeded;
                    completed.push(step.id.clone());
                    emitter.step_completed(&step.id, &step.label, &outcome.summary);
                    self.audit
                        .append(
                            AuditEvent::new(plan.actor, plan.source, AuditKind::StepCompleted, &plan.id, outcome.summary)
                                .for_step(&step.id)
                                .with_undo(step.undo.clone())
                                .with_redo(step.action.clone()),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(plan_id = %plan.id, step_id = %step.id, error = %e, "Step failed");
                    step.status = StepStatus::Failed;
                    step.error = Some(e.to_string());
                    emitter.step_failed(&step.id, &step.label, &e.to_string());
                    self.audit
                        .append(
                            AuditEvent::new(plan.actor, plan.source, AuditKind::StepFailed, &plan.id, e.to_string())
                                .for_step(&step.id),
                        )
                        .await;
                    failure = Some(StepExecutionError {
                        step_id: step.id.clone(),
                        label: step.label.clone(),
                        phase: StepPhase::Execute,
                        source: e,
                    });
                    break;
                }
            }
        }

        let status = match (&failure, completed.is_empty()) {
            (None, _) => PlanStatus::Success,
            (Some(_), false) => PlanStatus::Partial,
            (Some(_), true) => PlanStatus::Failed,
        };
        plan.set_status(status)?;
        info!("Plan {} finished: {}", plan.id, status);
        emitter.plan_finished(status);
        self.audit
            .append(AuditEvent::new(
                plan.actor,
                plan.source,
                AuditKind::PlanFinished,
                &plan.id,
                format!("{} ({}/{} steps)", status, completed.len(), plan.steps.len()),
            ))
            .await;

        let rollback = if failure.is_some() && self.config.rollback_on_failure && !completed.is_empty() {
            debug!("PlanRunner::run: rolling back after failure");
            Some(self.rollback(plan).await)
        } else {
            None
        };

        Ok(RunReport {
            plan_id: plan.id.clone(),
            status,
            completed,
            failure,
            rollback,
        })
    }

    /// Undo every succeeded step in reverse execution order
    ///
    /// Failing undos are recorded and do not stop the rest. A second call
    /// finds nothing left to undo.
    pub async fn rollback(&self, plan: &mut Plan) -> RollbackReport {
        debug!(plan_id = %plan.id, "PlanRunner::rollback: called");
        let mut report = RollbackReport {
            plan_id: plan.id.clone(),
            ..Default::default()
        };

        let to_undo: Vec<usize> = (0..plan.steps.len())
            .rev()
            .filter(|&i| plan.steps[i].is_completed())
            .collect();
        if to_undo.is_empty() {
            debug!("PlanRunner::rollback: nothing to undo");
            return report;
        }

        let emitter = self.events.emitter_for(&plan.id);
        let ctx = self.ctx.for_plan(&plan.id);

        for i in to_undo {
            let step = &mut plan.steps[i];
            debug!(step_id = %step.id, label = %step.label, "PlanRunner::rollback: undoing step");
            match self
                .executor
                .execute_with_timeout(&step.undo, &ctx, self.config.step_timeout)
                .await
            {
                Ok(outcome) => {
                    step.status = StepStatus::Undone;
                    report.undone.push(step.id.clone());
                    emitter.step_undone(&step.id, &step.label);
                    self.audit
                        .append(
                            AuditEvent::new(plan.actor, plan.source, AuditKind::StepUndone, &plan.id, outcome.summary)
                                .for_step(&step.id)
                                .with_undo(step.action.clone())
                                .with_redo(step.undo.clone()),
                        )
                        .await;
                }
                Err(e) => {
                    warn!(plan_id = %plan.id, step_id = %step.id, error = %e, "Undo failed");
                    step.status = StepStatus::UndoFailed;
                    step.error = Some(e.to_string());
                    emitter.undo_failed(&step.id, &e.to_string());
                    self.audit
                        .append(
                            AuditEvent::new(plan.actor, plan.source, AuditKind::UndoFailed, &plan.id, e.to_string())
                                .for_step(&step.id),
                        )
                        .await;
                    report.failures.push(StepExecutionError {
                        step_id: step.id.clone(),
                        label: step.label.clone(),
                        phase: StepPhase::Undo,
                        source: e,
                    });
                }
            }
        }

        plan.rolled_back_at = Some(Utc::now());
        info!(
            "Rolled back plan {}: {} undone, {} failed",
            plan.id,
            report.undone.len(),
            report.failures.len()
        );
        emitter.plan_rolled_back(report.undone.len(), report.failures.len());
        self.audit
            .append(AuditEvent::new(
                plan.actor,
                plan.source,
                AuditKind::PlanRolledBack,
                &plan.id,
                format!("{} undone, {} failed", report.undone.len(), report.failures.len()),
            ))
            .await;

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionError, ActionHandler, ActionOutcome, Clinic, testing};
    use crate::domain::{ActionKind, Actor, ClarificationQuestion, Source, Step, StepAction};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Noop handler that records notes and fails on notes starting with "fail"
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ActionHandler for Recorder {
        fn kind(&self) -> ActionKind {
            ActionKind::Noop
        }

        fn description(&self) -> &'static str {
            "records notes"
        }

        async fn execute(&self, action: &StepAction, _ctx: &ActionContext) -> Result<ActionOutcome, ActionError> {
            let StepAction::Noop { note } = action else {
                return Err(ActionError::mismatch(self.kind(), action));
            };
            if note.starts_with("fail") {
                return Err(ActionError::Failed(note.clone()));
            }
            self.log.lock().unwrap().push(note.clone());
            Ok(ActionOutcome::new(note.clone()))
        }
    }

    fn runner(rollback_on_failure: bool) -> (PlanRunner, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut executor = ActionExecutor::empty();
        executor.add_handler(Box::new(Recorder { log: log.clone() }));
        let runner = PlanRunner::new(
            Arc::new(executor),
            ActionContext::new(Clinic::default()),
            Arc::new(EventBus::new(64)),
            AuditLog::new(),
            RunnerConfig {
                step_timeout: None,
                rollback_on_failure,
            },
        );
        (runner, log)
    }

    fn step(name: &str, undo: &str) -> Step {
        Step::with_id(name, name, StepAction::noop(name), StepAction::noop(undo))
    }

    fn plan(steps: Vec<Step>) -> Plan {
        Plan::new("test", Actor::User, Source::Cmdk, steps)
    }

    #[tokio::test]
    async fn test_all_steps_succeed() {
        let (runner, log) = runner(true);
        let mut plan = plan(vec![step("a", "undo a"), step("b", "undo b")]);

        let report = runner.run(&mut plan).await.unwrap();

        assert_eq!(report.status, PlanStatus::Success);
        assert_eq!(plan.status, PlanStatus::Success);
        assert!(plan.finished_at.is_some());
        assert_eq!(report.completed, vec!["a", "b"]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_middle_failure_is_partial_and_rolls_back() {
        let (runner, log) = runner(true);
        let mut plan = plan(vec![step("a", "undo a"), step("fail b", "undo b"), step("c", "undo c")]);

        let report = runner.run(&mut plan).await.unwrap();

        assert_eq!(report.status, PlanStatus::Partial);
        assert_eq!(report.failure.as_ref().unwrap().step_id, "fail b");
        assert_eq!(plan.steps[0].status, StepStatus::Undone);
        assert_eq!(plan.steps[1].status, StepStatus::Failed);
        assert_eq!(plan.steps[2].status, StepStatus::Pending);
        assert_eq!(*log.lock().unwrap(), vec!["a", "undo a"]);
        assert_eq!(report.rollback.unwrap().undone, vec!["a"]);
        assert!(plan.rolled_back_at.is_some());
    }

    #[tokio::test]
    async fn test_first_step_failure_is_failed() {
        let (runner, log) = runner(true);
        let mut plan = plan(vec![step("fail a", "undo a"), step("b", "undo b")]);

        let report = runner.run(&mut plan).await.unwrap();

        assert_eq!(report.status, PlanStatus::Failed);
        assert!(report.rollback.is_none());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_auto_rollback_when_disabled() {
        let (runner, log) = runner(false);
        let mut plan = plan(vec![step("a", "undo a"), step("fail b", "undo b")]);

        let report = runner.run(&mut plan).await.unwrap();
        assert_eq!(report.status, PlanStatus::Partial);
        assert!(report.rollback.is_none());
        assert_eq!(plan.steps[0].status, StepStatus::Succeeded);

        let rollback = runner.rollback(&mut plan).await;
        assert_eq!(rollback.undone, vec!["a"]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "undo a"]);
    }

    #[tokio::test]
    async fn test_rollback_reverse_order_and_idempotent() {
        let (runner, log) = runner(true);
        let mut plan = plan(vec![step("a", "undo a"), step("b", "undo b"), step("c", "undo c")]);
        runner.run(&mut plan).await.unwrap();

        let first = runner.rollback(&mut plan).await;
        assert_eq!(first.undone, vec!["c", "b", "a"]);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "undo c", "undo b", "undo a"]);

        let second = runner.rollback(&mut plan).await;
        assert!(second.is_noop());
        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_failing_undo_does_not_stop_rollback() {
        let (runner, log) = runner(false);
        let mut plan = plan(vec![step("a", "undo a"), step("b", "fail undo b"), step("c", "undo c")]);
        runner.run(&mut plan).await.unwrap();

        let report = runner.rollback(&mut plan).await;
        assert_eq!(report.undone, vec!["c", "a"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].phase, StepPhase::Undo);
        assert_eq!(plan.steps[1].status, StepStatus::UndoFailed);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "undo c", "undo a"]);
    }

    #[tokio::test]
    async fn test_rollback_of_unrun_plan_is_noop() {
        let (runner, _) = runner(true);
        let mut plan = plan(vec![step("a", "undo a")]);
        assert!(runner.rollback(&mut plan).await.is_noop());
        assert!(plan.rolled_back_at.is_none());
    }

    #[tokio::test]
    async fn test_clarification_plan_is_not_run() {
        let (runner, log) = runner(true);
        let mut plan = Plan::needing_clarification(
            "Reschedule",
            Actor::User,
            Source::Cmdk,
            vec![ClarificationQuestion::date_picker("when", "When?")],
            "reschedule Sarah",
        )
        .unwrap();

        let err = runner.run(&mut plan).await.unwrap_err();
        assert!(matches!(err, PlanError::NeedsClarification { .. }));
        assert_eq!(plan.status, PlanStatus::Pending);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_plan_cannot_run_twice() {
        let (runner, _) = runner(true);
        let mut plan = plan(vec![step("a", "undo a")]);
        runner.run(&mut plan).await.unwrap();
        let err = runner.run(&mut plan).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_audit_and_events_recorded() {
        let (runner, _) = runner(true);
        let mut rx = runner.events.subscribe();
        let mut plan = plan(vec![step("a", "undo a"), step("fail b", "undo b")]);
        runner.run(&mut plan).await.unwrap();

        let kinds: Vec<AuditKind> = runner.audit().for_plan(&plan.id).await.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                AuditKind::StepCompleted,
                AuditKind::StepFailed,
                AuditKind::PlanFinished,
                AuditKind::StepUndone,
                AuditKind::PlanRolledBack,
            ]
        );

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "PlanStarted",
                "StepCompleted",
                "StepFailed",
                "PlanFinished",
                "StepUndone",
                "PlanRolledBack"
            ]
        );
    }

    #[tokio::test]
    async fn test_real_clinic_move_is_undone() {
        use crate::domain::AppointmentStatus;

        let ctx = testing::demo_ctx();
        let runner = PlanRunner::new(
            Arc::new(ActionExecutor::standard()),
            ctx.clone(),
            Arc::new(EventBus::new(64)),
            AuditLog::new(),
            RunnerConfig::default(),
        );
        let confirm = StepAction::SetAppointmentStatus {
            appointment_id: "apt-1001".into(),
            from: AppointmentStatus::Scheduled,
            to: AppointmentStatus::Confirmed,
        };
        let unconfirm = StepAction::SetAppointmentStatus {
            appointment_id: "apt-1001".into(),
            from: AppointmentStatus::Confirmed,
            to: AppointmentStatus::Scheduled,
        };
        let missing = StepAction::SendReminder {
            appointment_id: "apt-missing".into(),
        };
        let mut plan = plan(vec![
            Step::new("Confirm", confirm, unconfirm),
            Step::new("Remind", missing, StepAction::noop("nothing")),
        ]);

        let report = runner.run(&mut plan).await.unwrap();
        assert_eq!(report.status, PlanStatus::Partial);
        assert_eq!(
            ctx.clinic.snapshot().await.appointment("apt-1001").unwrap().status,
            AppointmentStatus::Scheduled
        );
    }
}
