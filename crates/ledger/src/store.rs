use std::collections::HashMap;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use sa_domain::error::{Error, Result};
use sa_domain::event::{Event, EventPayload, Snapshot, SnapshotKind};

/// Sort order for [`Ledger::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Filter for [`Ledger::query`]. All fields are optional; an empty query
/// returns every event in `order`.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub run_id: Option<String>,
    pub session_id: Option<String>,
    pub types: Option<Vec<String>>,
    pub after_seq: Option<i64>,
    pub before_seq: Option<i64>,
    pub limit: Option<i64>,
    pub order: Order,
}

/// Parameters for [`Ledger::create_snapshot`].
pub struct NewSnapshot {
    pub session_id: String,
    pub run_id: Option<String>,
    pub seq: i64,
    pub kind: SnapshotKind,
    pub data: serde_json::Value,
}

/// Filter for [`Ledger::get_latest_snapshot`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotQuery {
    pub session_id: String,
    pub run_id: Option<String>,
    pub kind: Option<SnapshotKind>,
}

struct Inner {
    conn: Connection,
    /// Per-`run_id` sequence high-water mark, rebuilt on startup and kept
    /// current on every append. Avoids a `MAX(seq)` scan per append.
    seq_counters: HashMap<String, i64>,
}

/// The append-only event + snapshot store (spec §4.1).
///
/// All mutation goes through a single internal mutex: this trivially
/// satisfies "append serializes per runId" (it serializes globally, which
/// is a stronger guarantee and simpler to reason about for an embedded
/// single-process store).
pub struct Ledger {
    inner: Mutex<Inner>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    event_id   TEXT PRIMARY KEY,
    run_id     TEXT NOT NULL,
    session_id TEXT NOT NULL,
    seq        INTEGER NOT NULL,
    ts         INTEGER NOT NULL,
    type       TEXT NOT NULL,
    payload    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_run_seq ON events(run_id, seq);
CREATE INDEX IF NOT EXISTS idx_events_session_seq ON events(session_id, seq);
CREATE INDEX IF NOT EXISTS idx_events_session_type_seq ON events(session_id, type, seq);

CREATE TABLE IF NOT EXISTS snapshots (
    snapshot_id TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL,
    run_id      TEXT,
    seq         INTEGER NOT NULL,
    type        TEXT NOT NULL,
    data        TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshots_session_type_seq ON snapshots(session_id, type, seq DESC);
"#;

impl Ledger {
    /// Open (and migrate) the ledger at `path`, or `:memory:` for an
    /// ephemeral ledger (spec §6 `<PRODUCT>_DB`).
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)
        }
        .map_err(|e| Error::StorageError(e.to_string()))?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::StorageError(e.to_string()))?;

        let ledger = Self {
            inner: Mutex::new(Inner {
                conn,
                seq_counters: HashMap::new(),
            }),
        };
        ledger.rebuild_seq_counters()?;
        Ok(ledger)
    }

    /// Reconstruct the per-`run_id` sequence high-water mark from persisted
    /// data. Must be called on startup before the first `append` so a
    /// restarted process assigns the same next `seq` a live process would
    /// have.
    pub fn rebuild_seq_counters(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let mut stmt = guard
            .conn
            .prepare("SELECT run_id, MAX(seq) FROM events GROUP BY run_id")
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let mut counters = HashMap::new();
        for row in rows {
            let (run_id, max_seq) = row.map_err(|e| Error::StorageError(e.to_string()))?;
            counters.insert(run_id, max_seq);
        }
        drop(stmt);
        guard.seq_counters = counters;
        Ok(())
    }

    /// Append an event, assigning `eventId`, the next dense `seq` for
    /// `run_id`, and `ts = now`. Atomic: a storage error leaves no partial
    /// row and does not advance the in-memory counter.
    pub fn append(&self, run_id: &str, session_id: &str, payload: EventPayload) -> Result<Event> {
        let mut guard = self.inner.lock();

        let next_seq = guard.seq_counters.get(run_id).copied().unwrap_or(0) + 1;
        let event_id = Uuid::new_v4().to_string();
        let ts = chrono::Utc::now().timestamp_millis();
        let type_str = payload.type_str();

        let full = serde_json::to_value(&payload)?;
        let payload_json = full
            .get("payload")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let payload_str = serde_json::to_string(&payload_json)?;

        guard
            .conn
            .execute(
                "INSERT INTO events (event_id, run_id, session_id, seq, ts, type, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![event_id, run_id, session_id, next_seq, ts, type_str, payload_str],
            )
            .map_err(|e| Error::StorageError(e.to_string()))?;

        guard.seq_counters.insert(run_id.to_string(), next_seq);

        Ok(Event {
            event_id,
            run_id: run_id.to_string(),
            session_id: session_id.to_string(),
            seq: next_seq,
            ts,
            payload,
        })
    }

    /// Ordered query over the ledger.
    pub fn query(&self, q: &EventQuery) -> Result<Vec<Event>> {
        let guard = self.inner.lock();

        let mut sql = String::from(
            "SELECT event_id, run_id, session_id, seq, ts, type, payload FROM events WHERE 1=1",
        );
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(run_id) = &q.run_id {
            sql.push_str(" AND run_id = ?");
            binds.push(Box::new(run_id.clone()));
        }
        if let Some(session_id) = &q.session_id {
            sql.push_str(" AND session_id = ?");
            binds.push(Box::new(session_id.clone()));
        }
        if let Some(types) = &q.types {
            if !types.is_empty() {
                let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                sql.push_str(&format!(" AND type IN ({placeholders})"));
                for t in types {
                    binds.push(Box::new(t.clone()));
                }
            }
        }
        if let Some(after) = q.after_seq {
            sql.push_str(" AND seq > ?");
            binds.push(Box::new(after));
        }
        if let Some(before) = q.before_seq {
            sql.push_str(" AND seq < ?");
            binds.push(Box::new(before));
        }
        sql.push_str(match q.order {
            Order::Asc => " ORDER BY seq ASC",
            Order::Desc => " ORDER BY seq DESC",
        });
        if let Some(limit) = q.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Box::new(limit));
        }

        let mut stmt = guard
            .conn
            .prepare(&sql)
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_event)
            .map_err(|e| Error::StorageError(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::StorageError(e.to_string()))?);
        }
        Ok(out)
    }

    /// All events for `run_id`, ascending and dense.
    pub fn get_by_run_id(&self, run_id: &str) -> Result<Vec<Event>> {
        self.query(&EventQuery {
            run_id: Some(run_id.to_string()),
            order: Order::Asc,
            ..Default::default()
        })
    }

    /// The most recent event of `type_str` on `session_id`, if any.
    pub fn query_latest(&self, session_id: &str, type_str: &str) -> Result<Option<Event>> {
        let results = self.query(&EventQuery {
            session_id: Some(session_id.to_string()),
            types: Some(vec![type_str.to_string()]),
            order: Order::Desc,
            limit: Some(1),
            ..Default::default()
        })?;
        Ok(results.into_iter().next())
    }

    pub fn create_snapshot(&self, new: NewSnapshot) -> Result<Snapshot> {
        let guard = self.inner.lock();
        let snapshot_id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp_millis();
        let kind_str = kind_to_str(new.kind);
        let data_str = serde_json::to_string(&new.data)?;

        guard
            .conn
            .execute(
                "INSERT INTO snapshots (snapshot_id, session_id, run_id, seq, type, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    snapshot_id,
                    new.session_id,
                    new.run_id,
                    new.seq,
                    kind_str,
                    data_str,
                    created_at
                ],
            )
            .map_err(|e| Error::StorageError(e.to_string()))?;

        Ok(Snapshot {
            snapshot_id,
            session_id: new.session_id,
            run_id: new.run_id,
            seq: new.seq,
            kind: new.kind,
            data: new.data,
            created_at,
        })
    }

    /// Highest-`seq` snapshot matching the query, or `None`.
    pub fn get_latest_snapshot(&self, q: &SnapshotQuery) -> Result<Option<Snapshot>> {
        let guard = self.inner.lock();

        let mut sql = String::from(
            "SELECT snapshot_id, session_id, run_id, seq, type, data, created_at
             FROM snapshots WHERE session_id = ?",
        );
        let mut binds: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(q.session_id.clone())];

        if let Some(run_id) = &q.run_id {
            sql.push_str(" AND run_id = ?");
            binds.push(Box::new(run_id.clone()));
        }
        if let Some(kind) = q.kind {
            sql.push_str(" AND type = ?");
            binds.push(Box::new(kind_to_str(kind).to_string()));
        }
        sql.push_str(" ORDER BY seq DESC LIMIT 1");

        let param_refs: Vec<&dyn rusqlite::ToSql> = binds.iter().map(|b| b.as_ref()).collect();
        guard
            .conn
            .query_row(&sql, param_refs.as_slice(), Self::row_to_snapshot)
            .optional()
            .map_err(|e| Error::StorageError(e.to_string()))
    }

    /// Distinct session ids, most-recently-active first.
    pub fn list_session_ids(&self) -> Result<Vec<String>> {
        let guard = self.inner.lock();
        let mut stmt = guard
            .conn
            .prepare(
                "SELECT session_id FROM events GROUP BY session_id ORDER BY MAX(ts) DESC",
            )
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::StorageError(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::StorageError(e.to_string()))?);
        }
        Ok(out)
    }

    pub fn close(&self) {
        let guard = self.inner.lock();
        let _ = guard.conn.execute_batch("PRAGMA optimize;");
    }

    fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
        let event_id: String = row.get(0)?;
        let run_id: String = row.get(1)?;
        let session_id: String = row.get(2)?;
        let seq: i64 = row.get(3)?;
        let ts: i64 = row.get(4)?;
        let type_str: String = row.get(5)?;
        let payload_str: String = row.get(6)?;

        let payload_json: serde_json::Value =
            serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null);
        let wrapped = serde_json::json!({ "type": type_str, "payload": payload_json });
        let payload: EventPayload = serde_json::from_value(wrapped).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Event {
            event_id,
            run_id,
            session_id,
            seq,
            ts,
            payload,
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
        let snapshot_id: String = row.get(0)?;
        let session_id: String = row.get(1)?;
        let run_id: Option<String> = row.get(2)?;
        let seq: i64 = row.get(3)?;
        let type_str: String = row.get(4)?;
        let data_str: String = row.get(5)?;
        let created_at: i64 = row.get(6)?;

        let data: serde_json::Value =
            serde_json::from_str(&data_str).unwrap_or(serde_json::Value::Null);
        let kind = str_to_kind(&type_str);

        Ok(Snapshot {
            snapshot_id,
            session_id,
            run_id,
            seq,
            kind,
            data,
            created_at,
        })
    }
}

fn kind_to_str(kind: SnapshotKind) -> &'static str {
    match kind {
        SnapshotKind::Run => "run",
        SnapshotKind::Session => "session",
        SnapshotKind::Checkpoint => "checkpoint",
    }
}

fn str_to_kind(s: &str) -> SnapshotKind {
    match s {
        "run" => SnapshotKind::Run,
        "checkpoint" => SnapshotKind::Checkpoint,
        _ => SnapshotKind::Session,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> Ledger {
        Ledger::open(":memory:").unwrap()
    }

    #[test]
    fn append_assigns_dense_monotonic_seq() {
        let l = ledger();
        for i in 1..=5 {
            let e = l
                .append(
                    "r1",
                    "s1",
                    EventPayload::OutputDelta {
                        text: format!("chunk {i}"),
                    },
                )
                .unwrap();
            assert_eq!(e.seq, i);
        }
    }

    #[test]
    fn seq_is_independent_per_run() {
        let l = ledger();
        l.append("r1", "s1", EventPayload::RunResumed {}).unwrap();
        l.append("r1", "s1", EventPayload::RunResumed {}).unwrap();
        let e = l.append("r2", "s1", EventPayload::RunResumed {}).unwrap();
        assert_eq!(e.seq, 1);
    }

    #[test]
    fn query_after_seq_excludes_earlier_events() {
        let l = ledger();
        l.append(
            "r1",
            "s1",
            EventPayload::OutputDelta { text: "First ".into() },
        )
        .unwrap();
        let second = l
            .append(
                "r1",
                "s1",
                EventPayload::OutputDelta {
                    text: "Second ".into(),
                },
            )
            .unwrap();
        l.append(
            "r1",
            "s1",
            EventPayload::OutputDelta { text: "Third".into() },
        )
        .unwrap();
        l.append(
            "r1",
            "s1",
            EventPayload::RunCompleted {
                steps: 1,
                input_tokens: 0,
                output_tokens: 0,
            },
        )
        .unwrap();

        let got = l
            .query(&EventQuery {
                run_id: Some("r1".into()),
                after_seq: Some(second.seq),
                order: Order::Asc,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(got.len(), 2);
        assert!(matches!(&got[0].payload, EventPayload::OutputDelta{text} if text == "Third"));
        assert!(matches!(&got[1].payload, EventPayload::RunCompleted{..}));
    }

    #[test]
    fn round_trips_nested_json_payload() {
        let l = ledger();
        let data = serde_json::json!({"a": [1, 2, {"b": true, "c": null}], "d": "text"});
        l.append(
            "r1",
            "s1",
            EventPayload::StateSnapshot { data: data.clone() },
        )
        .unwrap();
        let got = l.get_by_run_id("r1").unwrap();
        match &got[0].payload {
            EventPayload::StateSnapshot { data: got_data } => assert_eq!(got_data, &data),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn rebuild_seq_counters_resumes_from_persisted_max() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path_str = path.to_str().unwrap().to_string();

        {
            let l = Ledger::open(&path_str).unwrap();
            l.append("r1", "s1", EventPayload::RunResumed {}).unwrap();
            l.append("r1", "s1", EventPayload::RunResumed {}).unwrap();
        }

        let l2 = Ledger::open(&path_str).unwrap();
        let e = l2.append("r1", "s1", EventPayload::RunResumed {}).unwrap();
        assert_eq!(e.seq, 3);
    }

    #[test]
    fn snapshot_highest_seq_wins() {
        let l = ledger();
        l.create_snapshot(NewSnapshot {
            session_id: "s1".into(),
            run_id: None,
            seq: 5,
            kind: SnapshotKind::Session,
            data: serde_json::json!({"v": 1}),
        })
        .unwrap();
        l.create_snapshot(NewSnapshot {
            session_id: "s1".into(),
            run_id: None,
            seq: 10,
            kind: SnapshotKind::Session,
            data: serde_json::json!({"v": 2}),
        })
        .unwrap();

        let latest = l
            .get_latest_snapshot(&SnapshotQuery {
                session_id: "s1".into(),
                run_id: None,
                kind: Some(SnapshotKind::Session),
            })
            .unwrap()
            .unwrap();
        assert_eq!(latest.seq, 10);
        assert_eq!(latest.data["v"], 2);
    }

    #[test]
    fn list_session_ids_most_recent_first() {
        let l = ledger();
        l.append("r1", "old-session", EventPayload::RunResumed {})
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        l.append("r2", "new-session", EventPayload::RunResumed {})
            .unwrap();

        let ids = l.list_session_ids().unwrap();
        assert_eq!(ids[0], "new-session");
    }
}
