//! Event stream fan-out: replay-then-subscribe with no gap (spec §4.10).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use sa_domain::error::{Error, Result};
use sa_domain::event::Event;
use sa_ledger::{EventQuery, Ledger, Order};

use crate::run_manager::EventBus;

/// Bounded channel capacity for a single subscriber's forwarded stream.
const SUBSCRIBER_CAPACITY: usize = 256;

/// Parameters for [`subscribe`].
pub struct FanoutRequest {
    pub run_id: String,
    pub after_seq: Option<i64>,
    /// Resume token: the last event id the caller already has. Resolved to
    /// a `seq` via the ledger when `after_seq` is unset.
    pub last_event_id: Option<String>,
    pub cancel: CancellationToken,
}

/// Replays persisted events for `req.run_id` after the resolved cursor, then
/// forwards live events from `bus` with no gap, closing the channel on the
/// first terminal event or on cancellation.
pub fn subscribe(
    ledger: Arc<Ledger>,
    bus: EventBus,
    req: FanoutRequest,
) -> Result<mpsc::Receiver<Event>> {
    let after_seq = resolve_after_seq(&ledger, &req)?;
    let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);

    // Subscribe before querying so no event appended during the replay
    // query is lost (spec §4.10: "serialize subscribe-then-query-then-forward").
    let mut live = bus.subscribe();

    let run_id = req.run_id.clone();
    let cancel = req.cancel;

    tokio::spawn(async move {
        let mut last_seq = after_seq;

        let replayed = ledger.query(&EventQuery {
            run_id: Some(run_id.clone()),
            after_seq: Some(after_seq),
            order: Order::Asc,
            ..Default::default()
        });

        let replayed = match replayed {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "fan-out replay query failed");
                return;
            }
        };

        for event in replayed {
            last_seq = event.seq;
            let terminal = event.payload.is_terminal();
            if tx.send(event).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = live.recv() => {
                    match received {
                        Ok(event) => {
                            if event.run_id != run_id || event.seq <= last_seq {
                                continue;
                            }
                            last_seq = event.seq;
                            let terminal = event.payload.is_terminal();
                            if tx.send(event).await.is_err() {
                                return;
                            }
                            if terminal {
                                return;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, run_id = %run_id, "fan-out subscriber lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        }
    });

    Ok(rx)
}

fn resolve_after_seq(ledger: &Ledger, req: &FanoutRequest) -> Result<i64> {
    if let Some(seq) = req.after_seq {
        return Ok(seq);
    }
    let Some(event_id) = &req.last_event_id else {
        return Ok(0);
    };
    let events = ledger.get_by_run_id(&req.run_id)?;
    events
        .iter()
        .find(|e| &e.event_id == event_id)
        .map(|e| e.seq)
        .ok_or_else(|| Error::NotFound(event_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_manager::RunManager;
    use sa_domain::event::EventPayload;
    use sa_domain::run::{RunConfig, TokenUsage};

    fn manager() -> RunManager {
        RunManager::new(Arc::new(Ledger::open(":memory:").unwrap()))
    }

    fn config(session_id: &str) -> RunConfig {
        RunConfig {
            session_id: session_id.into(),
            prompt: "hi".into(),
            model: None,
            workspace: None,
            skills: vec![],
            max_steps: None,
        }
    }

    #[tokio::test]
    async fn replays_then_closes_on_persisted_terminal_event() {
        let mgr = manager();
        let r = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r.run_id).unwrap();
        let approvals = crate::approval_gate::ApprovalGate::new();
        mgr.complete_run(&r.run_id, &approvals, 1, TokenUsage::default())
            .unwrap();

        let mut rx = subscribe(
            mgr.ledger().clone(),
            mgr.event_bus(),
            FanoutRequest {
                run_id: r.run_id.clone(),
                after_seq: Some(0),
                last_event_id: None,
                cancel: CancellationToken::new(),
            },
        )
        .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.type_str(), "run.started");
        let second = rx.recv().await.unwrap();
        assert!(second.payload.is_terminal());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn forwards_live_events_after_replay() {
        let mgr = manager();
        let r = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r.run_id).unwrap();

        let mut rx = subscribe(
            mgr.ledger().clone(),
            mgr.event_bus(),
            FanoutRequest {
                run_id: r.run_id.clone(),
                after_seq: Some(0),
                last_event_id: None,
                cancel: CancellationToken::new(),
            },
        )
        .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);

        mgr.emit(&r.run_id, EventPayload::OutputDelta { text: "hi".into() })
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn ignores_events_from_other_runs() {
        let mgr = manager();
        let r1 = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r1.run_id).unwrap();
        let r2 = mgr.create_run(config("s2")).unwrap();
        mgr.start_run(&r2.run_id).unwrap();

        let mut rx = subscribe(
            mgr.ledger().clone(),
            mgr.event_bus(),
            FanoutRequest {
                run_id: r1.run_id.clone(),
                after_seq: Some(1),
                last_event_id: None,
                cancel: CancellationToken::new(),
            },
        )
        .unwrap();

        mgr.emit(&r2.run_id, EventPayload::OutputDelta { text: "other".into() })
            .unwrap();
        mgr.emit(&r1.run_id, EventPayload::OutputDelta { text: "mine".into() })
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.run_id, r1.run_id);
    }

    #[tokio::test]
    async fn cancellation_closes_the_stream() {
        let mgr = manager();
        let r = mgr.create_run(config("s1")).unwrap();
        mgr.start_run(&r.run_id).unwrap();
        let cancel = CancellationToken::new();

        let mut rx = subscribe(
            mgr.ledger().clone(),
            mgr.event_bus(),
            FanoutRequest {
                run_id: r.run_id.clone(),
                after_seq: Some(1),
                last_event_id: None,
                cancel: cancel.clone(),
            },
        )
        .unwrap();

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }
}
