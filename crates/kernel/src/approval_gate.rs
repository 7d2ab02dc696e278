//! Registry of suspended tool calls awaiting an external decision (spec
//! §4.3). The gate itself never emits events — the engine adapter emits
//! `approval.requested`/`approval.resolved` around it.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use sa_domain::error::{Error, Result};
use sa_domain::tool::{ApprovalDecision, RiskProfile};

/// Parameters for [`ApprovalGate::request_approval`].
pub struct NewApprovalRequest {
    pub call_id: String,
    pub tool_id: String,
    pub args: serde_json::Value,
    pub preview: Option<String>,
    pub risk: RiskProfile,
}

/// A suspended tool call awaiting an external decision (spec §3).
#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub approval_id: String,
    pub call_id: String,
    pub tool_id: String,
    pub args: serde_json::Value,
    pub preview: Option<String>,
    pub risk: RiskProfile,
    pub created_at: i64,
}

/// The resolution of a pending approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub decision: ApprovalDecision,
    pub reason: Option<String>,
    pub resolved_by: Option<String>,
}

struct Entry {
    pending: PendingApproval,
    respond: oneshot::Sender<Result<ApprovalOutcome>>,
}

/// The awaitable returned by [`ApprovalGate::request_approval`].
pub type ApprovalFuture = oneshot::Receiver<Result<ApprovalOutcome>>;

#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<String, Entry>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a suspended call and returns its id plus a one-shot
    /// future that resolves on `resolveApproval` or fails on cancellation.
    pub fn request_approval(&self, req: NewApprovalRequest) -> (String, ApprovalFuture) {
        let approval_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let pending = PendingApproval {
            approval_id: approval_id.clone(),
            call_id: req.call_id,
            tool_id: req.tool_id,
            args: req.args,
            preview: req.preview,
            risk: req.risk,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.pending.lock().insert(
            approval_id.clone(),
            Entry {
                pending,
                respond: tx,
            },
        );
        (approval_id, rx)
    }

    /// Completes a pending approval with a human decision.
    pub fn resolve_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
        reason: Option<String>,
        resolved_by: Option<String>,
    ) -> Result<()> {
        let entry = self
            .pending
            .lock()
            .remove(approval_id)
            .ok_or_else(|| Error::NotFound(approval_id.to_string()))?;
        let _ = entry.respond.send(Ok(ApprovalOutcome {
            decision,
            reason,
            resolved_by,
        }));
        Ok(())
    }

    /// Cancels a single pending approval, failing its future with
    /// `ApprovalCancelled`.
    pub fn cancel_approval(&self, approval_id: &str) -> Result<()> {
        let entry = self
            .pending
            .lock()
            .remove(approval_id)
            .ok_or_else(|| Error::NotFound(approval_id.to_string()))?;
        let _ = entry.respond.send(Err(Error::ApprovalCancelled));
        Ok(())
    }

    /// Cancels every pending approval (called by `completeRun`/`failRun`).
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock();
        for (_, entry) in pending.drain() {
            let _ = entry.respond.send(Err(Error::ApprovalCancelled));
        }
    }

    pub fn get_pending(&self) -> Vec<PendingApproval> {
        self.pending
            .lock()
            .values()
            .map(|e| e.pending.clone())
            .collect()
    }

    pub fn has_pending(&self, approval_id: &str) -> bool {
        self.pending.lock().contains_key(approval_id)
    }

    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::{ImpactSize, RiskCategory};

    fn risk() -> RiskProfile {
        RiskProfile {
            tool_id: "repo.patch".into(),
            category: RiskCategory::Write,
            estimated_impact: ImpactSize::Medium,
            touches_secrets: false,
            touches_config: false,
            touches_build: false,
        }
    }

    #[tokio::test]
    async fn approve_round_trip() {
        let gate = ApprovalGate::new();
        let (id, rx) = gate.request_approval(NewApprovalRequest {
            call_id: "c1".into(),
            tool_id: "repo.patch".into(),
            args: serde_json::json!({}),
            preview: None,
            risk: risk(),
        });
        assert_eq!(gate.get_pending().len(), 1);

        gate.resolve_approval(
            &id,
            ApprovalDecision::Approve,
            Some("ok".into()),
            Some("reviewer".into()),
        )
        .unwrap();

        let outcome = rx.await.unwrap().unwrap();
        assert!(matches!(outcome.decision, ApprovalDecision::Approve));
        assert_eq!(outcome.reason.as_deref(), Some("ok"));
        assert_eq!(gate.get_pending().len(), 0);
    }

    #[tokio::test]
    async fn cancel_all_fails_every_future() {
        let gate = ApprovalGate::new();
        let (_id1, rx1) = gate.request_approval(NewApprovalRequest {
            call_id: "c1".into(),
            tool_id: "repo.patch".into(),
            args: serde_json::json!({}),
            preview: None,
            risk: risk(),
        });
        let (_id2, rx2) = gate.request_approval(NewApprovalRequest {
            call_id: "c2".into(),
            tool_id: "process.run".into(),
            args: serde_json::json!({}),
            preview: None,
            risk: risk(),
        });

        gate.cancel_all();

        assert!(matches!(
            rx1.await.unwrap().unwrap_err(),
            Error::ApprovalCancelled
        ));
        assert!(matches!(
            rx2.await.unwrap().unwrap_err(),
            Error::ApprovalCancelled
        ));
        assert_eq!(gate.size(), 0);
    }

    #[test]
    fn resolve_unknown_is_not_found() {
        let gate = ApprovalGate::new();
        assert!(matches!(
            gate.resolve_approval(
                "nope",
                ApprovalDecision::Approve,
                None,
                None
            )
            .unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
