//! The run lifecycle state machine, session lock set, and in-process event
//! broadcast (spec §4.2).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use sa_domain::error::{Error, Result};
use sa_domain::event::{Event, EventPayload};
use sa_domain::run::{RunConfig, RunRecord, RunState, TokenUsage};
use sa_ledger::Ledger;

/// Capacity of the in-process broadcast channel. A slow subscriber lags
/// and is told so (spec §5 "fairness/backpressure") rather than blocking
/// faster ones.
const BROADCAST_CAPACITY: usize = 4096;

/// A live subscription to every appended event, regardless of run.
/// Cloning gives a fresh receiver positioned at "now".
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    fn publish(&self, event: Event) {
        // No receivers is not an error -- ignore SendError.
        let _ = self.sender.send(event);
    }
}

/// Handle returned by [`RunManager::on_event`]. Call [`Self::cancel`] to
/// stop delivering events to the listener.
pub struct ListenerHandle {
    task: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    pub fn cancel(self) {
        self.task.abort();
    }
}

pub struct RunManager {
    ledger: Arc<Ledger>,
    runs: RwLock<HashMap<String, RunRecord>>,
    session_locks: RwLock<HashSet<String>>,
    bus: EventBus,
}

impl RunManager {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            runs: RwLock::new(HashMap::new()),
            session_locks: RwLock::new(HashSet::new()),
            bus: EventBus::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn event_bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.read().get(run_id).cloned()
    }

    pub fn is_session_locked(&self, session_id: &str) -> bool {
        self.session_locks.read().contains(session_id)
    }

    /// Creates the run record in `created` state. Does not lock the session
    /// and does not emit anything (spec §4.2).
    pub fn create_run(&self, config: RunConfig) -> Result<RunRecord> {
        if self.is_session_locked(&config.session_id) {
            return Err(Error::SessionBusy(config.session_id));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();
        let record = RunRecord {
            run_id: run_id.clone(),
            session_id: config.session_id,
            state: RunState::Created,
            created_at: now,
            updated_at: now,
            model: config.model.unwrap_or_default(),
            workspace: config.workspace.unwrap_or_default(),
            prompt: config.prompt,
            skills: config.skills,
            current_step: 0,
            token_usage: TokenUsage::default(),
            max_steps: config.max_steps,
        };
        self.runs.write().insert(run_id, record.clone());
        Ok(record)
    }

    /// `created -> running`; locks the session; emits `run.started`.
    pub fn start_run(&self, run_id: &str) -> Result<Event> {
        let session_id = {
            let mut runs = self.runs.write();
            let record = self.get_mut_checked(&mut runs, run_id, RunState::Running)?;
            record.state = RunState::Running;
            record.updated_at = chrono::Utc::now().timestamp_millis();
            record.session_id.clone()
        };
        self.session_locks.write().insert(session_id.clone());

        let (model, workspace, skills) = {
            let runs = self.runs.read();
            let r = &runs[run_id];
            (r.model.clone(), r.workspace.clone(), r.skills.clone())
        };
        self.append_and_publish(
            run_id,
            &session_id,
            EventPayload::RunStarted {
                model,
                workspace,
                skills,
            },
        )
    }

    /// `running -> paused`; emits `run.paused{reason: "approval", approvalId}`.
    pub fn pause_run(&self, run_id: &str, approval_id: &str) -> Result<Event> {
        let session_id = self.transition(run_id, RunState::Paused)?;
        self.append_and_publish(
            run_id,
            &session_id,
            EventPayload::RunPaused {
                reason: "approval".into(),
                approval_id: approval_id.to_string(),
            },
        )
    }

    /// `paused -> running`; emits `run.resumed`.
    pub fn resume_run(&self, run_id: &str) -> Result<Event> {
        let session_id = self.transition(run_id, RunState::Running)?;
        self.append_and_publish(run_id, &session_id, EventPayload::RunResumed {})
    }

    /// Any active state `-> completed`; unlocks the session and cancels any
    /// stranded approvals; emits `run.completed`.
    pub fn complete_run(
        &self,
        run_id: &str,
        approvals: &crate::approval_gate::ApprovalGate,
        steps: u32,
        usage: TokenUsage,
    ) -> Result<Event> {
        let session_id = self.transition(run_id, RunState::Completed)?;
        self.session_locks.write().remove(&session_id);
        approvals.cancel_all();
        self.append_and_publish(
            run_id,
            &session_id,
            EventPayload::RunCompleted {
                steps,
                input_tokens: usage.input,
                output_tokens: usage.output,
            },
        )
    }

    /// Any active state `-> failed`; unlocks the session and cancels any
    /// stranded approvals; emits `run.failed`.
    pub fn fail_run(
        &self,
        run_id: &str,
        approvals: &crate::approval_gate::ApprovalGate,
        error: impl Into<String>,
        code: Option<String>,
    ) -> Result<Event> {
        let session_id = self.transition(run_id, RunState::Failed)?;
        self.session_locks.write().remove(&session_id);
        approvals.cancel_all();
        self.append_and_publish(
            run_id,
            &session_id,
            EventPayload::RunFailed {
                error: error.into(),
                code,
            },
        )
    }

    /// Appends and broadcasts an event that does not itself change run
    /// state (engine/tool instrumentation, memory events, ...). Refuses to
    /// emit past a run's terminal event.
    pub fn emit(&self, run_id: &str, payload: EventPayload) -> Result<Event> {
        let session_id = {
            let runs = self.runs.read();
            let record = runs
                .get(run_id)
                .ok_or_else(|| Error::NotFound(run_id.to_string()))?;
            if record.state.is_terminal() {
                return Err(Error::InvalidTransition {
                    from: format!("{:?}", record.state),
                    to: payload.type_str().to_string(),
                });
            }
            record.session_id.clone()
        };
        self.append_and_publish(run_id, &session_id, payload)
    }

    pub fn increment_step(&self, run_id: &str) {
        if let Some(record) = self.runs.write().get_mut(run_id) {
            record.current_step += 1;
            record.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    pub fn add_token_usage(&self, run_id: &str, input: u64, output: u64) {
        if let Some(record) = self.runs.write().get_mut(run_id) {
            record.token_usage.input += input;
            record.token_usage.output += output;
            record.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    /// Subscribes `listener` to every future event (regardless of origin),
    /// in append order. A listener added mid-emission only ever observes
    /// events appended strictly after this call returns (spec §9 open
    /// question). Listener panics are isolated to the listener's own task
    /// and never affect emission or other listeners.
    pub fn on_event<F>(&self, mut listener: F) -> ListenerHandle
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut rx = self.bus.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ListenerHandle { task }
    }

    fn append_and_publish(
        &self,
        run_id: &str,
        session_id: &str,
        payload: EventPayload,
    ) -> Result<Event> {
        let event = self.ledger.append(run_id, session_id, payload)?;
        self.bus.publish(event.clone());
        Ok(event)
    }

    fn transition(&self, run_id: &str, to: RunState) -> Result<String> {
        let mut runs = self.runs.write();
        let record = self.get_mut_checked(&mut runs, run_id, to)?;
        record.state = to;
        record.updated_at = chrono::Utc::now().timestamp_millis();
        Ok(record.session_id.clone())
    }

    fn get_mut_checked<'a>(
        &self,
        runs: &'a mut HashMap<String, RunRecord>,
        run_id: &str,
        to: RunState,
    ) -> Result<&'a mut RunRecord> {
        let record = runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(run_id.to_string()))?;
        if !record.state.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: format!("{:?}", record.state),
                to: format!("{to:?}"),
            });
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval_gate::ApprovalGate;

    fn manager() -> RunManager {
        RunManager::new(Arc::new(Ledger::open(":memory:").unwrap()))
    }

    fn config(session_id: &str) -> RunConfig {
        RunConfig {
            session_id: session_id.into(),
            prompt: "hi".into(),
            model: Some("anthropic/claude".into()),
            workspace: Some("/ws".into()),
            skills: vec![],
            max_steps: None,
        }
    }

    #[test]
    fn create_run_copies_max_steps_from_config() {
        let mgr = manager();
        let mut c = config("s1");
        c.max_steps = Some(5);
        let r = mgr.create_run(c).unwrap();
        assert_eq!(r.max_steps, Some(5));
    }

    #[test]
    fn duplicate_create_on_locked_session_fails() {
        let mgr = manager();
        let r1 = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r1.run_id).unwrap();

        let err = mgr.create_run(config("s1")).unwrap_err();
        assert!(matches!(err, Error::SessionBusy(_)));
    }

    #[test]
    fn full_lifecycle_emits_in_order() {
        let mgr = manager();
        let approvals = ApprovalGate::new();
        let r = mgr.create_run(config("s1")).unwrap();
        assert_eq!(r.state, RunState::Created);

        let started = mgr.start_run(&r.run_id).unwrap();
        assert_eq!(started.seq, 1);
        assert!(mgr.is_session_locked("s1"));

        mgr.emit(
            &r.run_id,
            EventPayload::OutputDelta { text: "hi".into() },
        )
        .unwrap();

        let completed = mgr
            .complete_run(&r.run_id, &approvals, 1, TokenUsage::default())
            .unwrap();
        assert!(matches!(completed.payload, EventPayload::RunCompleted { .. }));
        assert!(!mgr.is_session_locked("s1"));

        let all = mgr.ledger().get_by_run_id(&r.run_id).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.last().unwrap().payload.is_terminal());
    }

    #[test]
    fn terminal_state_rejects_further_transitions() {
        let mgr = manager();
        let approvals = ApprovalGate::new();
        let r = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r.run_id).unwrap();
        mgr.complete_run(&r.run_id, &approvals, 0, TokenUsage::default())
            .unwrap();

        assert!(matches!(
            mgr.resume_run(&r.run_id).unwrap_err(),
            Error::InvalidTransition { .. }
        ));
        assert!(matches!(
            mgr.emit(&r.run_id, EventPayload::RunResumed {}).unwrap_err(),
            Error::InvalidTransition { .. }
        ));
    }

    #[test]
    fn session_unlocks_after_another_run_created() {
        let mgr = manager();
        let approvals = ApprovalGate::new();
        let r1 = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r1.run_id).unwrap();
        mgr.complete_run(&r1.run_id, &approvals, 0, TokenUsage::default())
            .unwrap();

        let r2 = mgr.create_run(config("s1")).unwrap();
        assert_ne!(r1.run_id, r2.run_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listener_sees_only_events_after_subscribe() {
        let mgr = manager();
        let r = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r.run_id).unwrap(); // before subscribe

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let handle = mgr.on_event(move |e| seen2.lock().push(e.type_str().to_string()));

        // Give the spawned listener task a chance to actually subscribe.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let approvals = ApprovalGate::new();
        mgr.complete_run(&r.run_id, &approvals, 0, TokenUsage::default())
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.cancel();

        let seen = seen.lock();
        assert!(!seen.contains(&"run.started".to_string()));
        assert!(seen.contains(&"run.completed".to_string()));
    }
}
