//! Drives the observe → reflect pipeline for a single completed run
//! (spec §4.9). Errors are logged and swallowed; this must never fail the
//! run that triggered it.

use sa_domain::event::{EventPayload, SeqRange};
use sa_domain::run::SessionSnapshotData;
use sa_ledger::{EventQuery, Ledger, NewSnapshot, Order, SnapshotQuery};
use sa_providers::router::LlmRouter;

use crate::{observer, reflector};

/// Thresholds controlling when the Memory Service distills events and
/// observations (spec §4.9 Parameters).
#[derive(Debug, Clone, Copy)]
pub struct MemoryParams {
    /// Minimum unobserved events before calling the Observer. Default 20.
    pub observation_threshold: usize,
    /// Minimum accumulated observations before calling the Reflector. Default 10.
    pub reflection_threshold: usize,
}

impl Default for MemoryParams {
    fn default() -> Self {
        Self {
            observation_threshold: 20,
            reflection_threshold: 10,
        }
    }
}

impl From<sa_domain::config::MemoryConfig> for MemoryParams {
    fn from(cfg: sa_domain::config::MemoryConfig) -> Self {
        Self {
            observation_threshold: cfg.observation_threshold,
            reflection_threshold: cfg.reflection_threshold,
        }
    }
}

pub struct MemoryService {
    ledger: std::sync::Arc<Ledger>,
    router: std::sync::Arc<LlmRouter>,
    params: MemoryParams,
}

impl MemoryService {
    pub fn new(
        ledger: std::sync::Arc<Ledger>,
        router: std::sync::Arc<LlmRouter>,
        params: MemoryParams,
    ) -> Self {
        Self {
            ledger,
            router,
            params,
        }
    }

    /// Runs the observe/reflect pipeline for the just-completed `run_id` on
    /// `session_id`. Never returns an error to the caller — every failure is
    /// logged and treated as "nothing to distill this round".
    ///
    /// `lastObservedSeq` is read from the latest `session` snapshot, but is
    /// only honored when that snapshot was produced by this same run: `seq`
    /// is dense per `runId` (spec §3), so a high-water mark from a prior run
    /// on the same session cannot be compared against this run's `seq`
    /// values. A new run always starts this scan from `seq` 0.
    pub async fn process_run(&self, run_id: &str, session_id: &str) {
        if let Err(e) = self.try_process_run(run_id, session_id).await {
            tracing::warn!(run_id = %run_id, session_id = %session_id, error = %e, "memory service: run processing failed, skipping");
        }
    }

    async fn try_process_run(
        &self,
        run_id: &str,
        session_id: &str,
    ) -> sa_domain::error::Result<()> {
        let snapshot = self.ledger.get_latest_snapshot(&SnapshotQuery {
            session_id: session_id.to_string(),
            run_id: None,
            kind: Some(sa_domain::event::SnapshotKind::Session),
        })?;

        let mut prior: SessionSnapshotData = match &snapshot {
            Some(s) if s.run_id.as_deref() == Some(run_id) => {
                serde_json::from_value(s.data.clone()).unwrap_or_default()
            }
            Some(s) => {
                // Prior snapshot belongs to a different run on this session;
                // its observations/reflections accumulate, but its
                // `lastObservedSeq` doesn't apply to this run's seq space.
                let mut data: SessionSnapshotData =
                    serde_json::from_value(s.data.clone()).unwrap_or_default();
                data.last_observed_seq = 0;
                data
            }
            None => SessionSnapshotData::default(),
        };

        let events = self.ledger.query(&EventQuery {
            run_id: Some(run_id.to_string()),
            after_seq: Some(prior.last_observed_seq),
            order: Order::Asc,
            ..Default::default()
        })?;

        if events.len() < self.params.observation_threshold {
            tracing::debug!(
                run_id = %run_id,
                count = events.len(),
                threshold = self.params.observation_threshold,
                "memory service: below observation threshold, skipping"
            );
            return Ok(());
        }

        let new_observations = observer::observe(&self.router, &events).await;
        let seq_range = SeqRange {
            start: events.first().map(|e| e.seq).unwrap_or(prior.last_observed_seq),
            end: events.last().map(|e| e.seq).unwrap_or(prior.last_observed_seq),
        };

        self.ledger.append(
            run_id,
            session_id,
            EventPayload::MemoryObserved {
                observations: new_observations.clone(),
                processed_seq_range: seq_range,
            },
        )?;

        prior.observations.extend(new_observations);
        prior.last_observed_seq = seq_range.end;

        if prior.observations.len() >= self.params.reflection_threshold {
            let reflections = reflector::reflect(&self.router, &prior.observations).await;
            if !reflections.is_empty() {
                self.ledger.append(
                    run_id,
                    session_id,
                    EventPayload::MemoryReflected {
                        reflections: reflections.clone(),
                    },
                )?;
                prior.reflections = reflections;
            }
        }

        self.ledger.create_snapshot(NewSnapshot {
            session_id: session_id.to_string(),
            run_id: Some(run_id.to_string()),
            seq: seq_range.end,
            kind: sa_domain::event::SnapshotKind::Session,
            data: serde_json::to_value(&prior)?,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::error::Result;
    use sa_domain::stream::{BoxStream, StreamEvent};
    use sa_providers::registry::ProviderRegistry;
    use sa_providers::traits::{
        ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider,
    };
    use sa_domain::config::{LlmConfig, RoleConfig};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct NoToolCallProvider {
        caps: LlmCapabilities,
    }

    #[async_trait]
    impl LlmProvider for NoToolCallProvider {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: "nothing to report".into(),
                tool_calls: vec![],
                usage: None,
                model: "test".into(),
                finish_reason: Some("stop".into()),
            })
        }
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            unimplemented!()
        }
        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }
        fn capabilities(&self) -> &LlmCapabilities {
            &self.caps
        }
        fn provider_id(&self) -> &str {
            "test"
        }
    }

    fn router_with_no_tool_call_provider() -> Arc<LlmRouter> {
        let caps = LlmCapabilities {
            supports_tools: sa_domain::capability::ToolSupport::Basic,
            supports_streaming: false,
            supports_json_mode: false,
            supports_vision: false,
            context_window_tokens: None,
            max_output_tokens: None,
        };
        let registry = ProviderRegistry::from_config(&LlmConfig::default())
            .unwrap()
            .with_provider("test", Arc::new(NoToolCallProvider { caps }));
        let mut roles = HashMap::new();
        roles.insert(
            "observer".to_string(),
            RoleConfig {
                model: "test/test-model".into(),
                require_tools: false,
                require_json: false,
                require_streaming: false,
                fallbacks: vec![],
            },
        );
        roles.insert(
            "reflector".to_string(),
            RoleConfig {
                model: "test/test-model".into(),
                require_tools: false,
                require_json: false,
                require_streaming: false,
                fallbacks: vec![],
            },
        );
        Arc::new(LlmRouter::new(registry, roles, 5_000))
    }

    #[tokio::test]
    async fn below_threshold_is_a_noop() {
        let ledger = Arc::new(Ledger::open(":memory:").unwrap());
        ledger
            .append(
                "r1",
                "s1",
                EventPayload::RunStarted {
                    model: "test/test-model".into(),
                    workspace: "/tmp".into(),
                    skills: vec![],
                },
            )
            .unwrap();

        let service = MemoryService::new(
            ledger.clone(),
            router_with_no_tool_call_provider(),
            MemoryParams {
                observation_threshold: 20,
                reflection_threshold: 10,
            },
        );
        service.process_run("r1", "s1").await;

        let snap = ledger
            .get_latest_snapshot(&SnapshotQuery {
                session_id: "s1".into(),
                run_id: None,
                kind: Some(sa_domain::event::SnapshotKind::Session),
            })
            .unwrap();
        assert!(snap.is_none());
    }

    #[tokio::test]
    async fn above_threshold_emits_memory_observed_with_empty_observations_on_no_tool_call() {
        let ledger = Arc::new(Ledger::open(":memory:").unwrap());
        for _ in 0..21 {
            ledger
                .append("r1", "s1", EventPayload::OutputDelta { text: "x".into() })
                .unwrap();
        }

        let service = MemoryService::new(
            ledger.clone(),
            router_with_no_tool_call_provider(),
            MemoryParams::default(),
        );
        service.process_run("r1", "s1").await;

        let events = ledger
            .query(&EventQuery {
                run_id: Some("r1".into()),
                types: Some(vec!["memory.observed".to_string()]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(events.len(), 1);
        if let EventPayload::MemoryObserved { observations, .. } = &events[0].payload {
            assert!(observations.is_empty());
        } else {
            panic!("expected MemoryObserved");
        }

        // No reflection: 0 accumulated observations < reflection_threshold.
        let reflected = ledger
            .query(&EventQuery {
                run_id: Some("r1".into()),
                types: Some(vec!["memory.reflected".to_string()]),
                ..Default::default()
            })
            .unwrap();
        assert!(reflected.is_empty());

        let snap = ledger
            .get_latest_snapshot(&SnapshotQuery {
                session_id: "s1".into(),
                run_id: None,
                kind: Some(sa_domain::event::SnapshotKind::Session),
            })
            .unwrap()
            .expect("snapshot created");
        let data: SessionSnapshotData = serde_json::from_value(snap.data).unwrap();
        assert_eq!(data.last_observed_seq, 21);
    }
}
