//! Daemon-side run registry.
//!
//! Each run owns an append-only, totally ordered event log written by a
//! single task. Live subscribers receive events as they are appended;
//! late subscribers get a replay of the whole log. Completed runs are
//! retained for a bounded replay window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use smz_models::{RunEvent, RunState, SlideExtractionResult};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Completed runs retained for replay.
const RETAINED_COMPLETED_RUNS: usize = 50;
const BROADCAST_CAPACITY: usize = 256;

struct RunEntry {
    url: String,
    state: RunState,
    created_at_ms: i64,
    events: Vec<RunEvent>,
    live: broadcast::Sender<RunEvent>,
    slides_manifest: Option<SlideExtractionResult>,
}

/// Public, copyable view of one run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub id: String,
    pub url: String,
    pub state: RunState,
    pub created_at_ms: i64,
    pub events: Vec<RunEvent>,
    pub slides_manifest: Option<SlideExtractionResult>,
}

/// What a new subscriber starts from.
pub struct Subscription {
    /// Everything appended so far, in order.
    pub replay: Vec<RunEvent>,
    /// Live feed; `None` when the run already finished.
    pub live: Option<broadcast::Receiver<RunEvent>>,
}

/// All runs known to the daemon.
#[derive(Default)]
pub struct RunRegistry {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    runs: HashMap<String, RunEntry>,
    completed_order: VecDeque<String>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new queued run, returning its id.
    pub async fn create(&self, url: &str, now_ms: i64) -> String {
        let id = Uuid::new_v4().to_string();
        let (live, _) = broadcast::channel(BROADCAST_CAPACITY);
        let entry = RunEntry {
            url: url.to_string(),
            state: RunState::Queued,
            created_at_ms: now_ms,
            events: Vec::new(),
            live,
            slides_manifest: None,
        };
        self.inner.lock().await.runs.insert(id.clone(), entry);
        debug!(run_id = %id, url = %url, "Run created");
        id
    }

    /// Monotonic state transition; downgrades are ignored.
    pub async fn set_state(&self, id: &str, state: RunState) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.runs.get_mut(id) else {
            return;
        };
        let allowed = match (entry.state, state) {
            (RunState::Queued, _) => true,
            (RunState::Running, RunState::Done | RunState::Failed) => true,
            _ => false,
        };
        if allowed {
            entry.state = state;
        }
        if state.is_terminal() {
            inner.completed_order.push_back(id.to_string());
            Self::trim_completed(&mut inner);
        }
    }

    fn trim_completed(inner: &mut Registry) {
        while inner.completed_order.len() > RETAINED_COMPLETED_RUNS {
            if let Some(old) = inner.completed_order.pop_front() {
                inner.runs.remove(&old);
                debug!(run_id = %old, "Dropped completed run past retention window");
            }
        }
    }

    /// Append one event (single writer per run) and fan out to live
    /// subscribers.
    pub async fn append(&self, id: &str, event: RunEvent) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.runs.get_mut(id) {
            if let RunEvent::Slides(value) = &event {
                if value.get("ok").and_then(|v| v.as_bool()) == Some(true) {
                    if let Some(manifest) = value.get("manifest") {
                        entry.slides_manifest = serde_json::from_value(manifest.clone()).ok();
                    }
                }
            }
            entry.events.push(event.clone());
            let _ = entry.live.send(event);
        }
    }

    /// Subscribe: replay of the log so far plus a live feed until `done`.
    pub async fn subscribe(&self, id: &str) -> Option<Subscription> {
        let inner = self.inner.lock().await;
        let entry = inner.runs.get(id)?;
        let live = (!entry.state.is_terminal()).then(|| entry.live.subscribe());
        Some(Subscription {
            replay: entry.events.clone(),
            live,
        })
    }

    pub async fn snapshot(&self, id: &str) -> Option<RunSnapshot> {
        let inner = self.inner.lock().await;
        inner.runs.get(id).map(|entry| RunSnapshot {
            id: id.to_string(),
            url: entry.url.clone(),
            state: entry.state,
            created_at_ms: entry.created_at_ms,
            events: entry.events.clone(),
            slides_manifest: entry.slides_manifest.clone(),
        })
    }

    /// Whether no run is currently queued or running.
    pub async fn is_idle(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.runs.values().all(|e| e.state.is_terminal())
    }

    pub async fn active_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .runs
            .values()
            .filter(|e| !e.state.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_replay_in_order() {
        let registry = RunRegistry::new();
        let id = registry.create("https://a/", 0).await;
        registry.set_state(&id, RunState::Running).await;

        for i in 0..3 {
            registry
                .append(
                    &id,
                    RunEvent::Chunk {
                        text: format!("part {i}"),
                    },
                )
                .await;
        }
        registry.append(&id, RunEvent::Done {}).await;
        registry.set_state(&id, RunState::Done).await;

        let sub = registry.subscribe(&id).await.unwrap();
        assert!(sub.live.is_none(), "finished runs have no live feed");
        assert_eq!(sub.replay.len(), 4);
        assert_eq!(
            sub.replay[0],
            RunEvent::Chunk {
                text: "part 0".to_string()
            }
        );
        assert_eq!(sub.replay[3], RunEvent::Done {});
    }

    #[tokio::test]
    async fn test_live_subscriber_sees_later_events() {
        let registry = RunRegistry::new();
        let id = registry.create("https://a/", 0).await;
        registry.set_state(&id, RunState::Running).await;
        registry
            .append(
                &id,
                RunEvent::Chunk {
                    text: "early".to_string(),
                },
            )
            .await;

        let mut sub = registry.subscribe(&id).await.unwrap();
        assert_eq!(sub.replay.len(), 1);
        let mut live = sub.live.take().unwrap();

        registry
            .append(
                &id,
                RunEvent::Chunk {
                    text: "late".to_string(),
                },
            )
            .await;
        let received = live.recv().await.unwrap();
        assert_eq!(
            received,
            RunEvent::Chunk {
                text: "late".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_state_transitions_monotonic() {
        let registry = RunRegistry::new();
        let id = registry.create("https://a/", 0).await;
        registry.set_state(&id, RunState::Running).await;
        registry.set_state(&id, RunState::Done).await;
        // A later downgrade attempt is ignored.
        registry.set_state(&id, RunState::Running).await;
        assert_eq!(
            registry.snapshot(&id).await.unwrap().state,
            RunState::Done
        );
    }

    #[tokio::test]
    async fn test_completed_retention_window() {
        let registry = RunRegistry::new();
        let mut ids = Vec::new();
        for i in 0..(RETAINED_COMPLETED_RUNS + 5) {
            let id = registry.create(&format!("https://a/{i}"), i as i64).await;
            registry.set_state(&id, RunState::Running).await;
            registry.set_state(&id, RunState::Done).await;
            ids.push(id);
        }
        assert!(registry.snapshot(&ids[0]).await.is_none(), "oldest dropped");
        assert!(registry
            .snapshot(ids.last().unwrap())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_idle_tracking() {
        let registry = RunRegistry::new();
        assert!(registry.is_idle().await);
        let id = registry.create("https://a/", 0).await;
        assert!(!registry.is_idle().await);
        registry.set_state(&id, RunState::Running).await;
        registry.set_state(&id, RunState::Failed).await;
        assert!(registry.is_idle().await);
    }
}
