use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, RwLock};
use warp::ws::Message;

use super::messages::{ServerMessage, Standing};
use super::ROUND_DURATION_MS;
use crate::store::Question;

/// How often the registry looks for finished, empty rooms to drop.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one websocket client: a process-unique id used for identity
/// checks (host binding, participant lookup) and the outbound channel that
/// feeds its sender task.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub id: u64,
    sender: mpsc::UnboundedSender<Message>,
}

impl ConnHandle {
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id: NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Fire-and-forget delivery. A closed connection is silently skipped,
    /// never queued or retried.
    pub fn send(&self, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(text) => {
                let _ = self.sender.send(Message::text(text));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize outbound message");
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub name: String,
    pub score: u32,
    pub total_time_ms: u64,
    pub conn: ConnHandle,
    pub answered_current: bool,
}

/// Mutable state of one quiz session. All mutation happens behind the room's
/// mutex, so every inbound event and timer callback is applied atomically.
pub struct RoomState {
    pub code: String,
    pub host: Option<ConnHandle>,
    participants: HashMap<String, Participant>,
    /// Secondary index: connection id to participant name.
    by_conn: HashMap<u64, String>,
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub round_active: bool,
    pub round_started_at: Option<u64>,
    /// Timer identity: a timer armed for generation N is a no-op once the
    /// room has moved past N.
    pub round_generation: u64,
    pub ended: bool,
}

impl RoomState {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            host: None,
            participants: HashMap::new(),
            by_conn: HashMap::new(),
            questions: Vec::new(),
            current_index: 0,
            round_active: false,
            round_started_at: None,
            round_generation: 0,
            ended: false,
        }
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.participants.contains_key(name)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn add_participant(&mut self, name: String, conn: ConnHandle) {
        self.by_conn.insert(conn.id, name.clone());
        self.participants.insert(
            name.clone(),
            Participant {
                name,
                score: 0,
                total_time_ms: 0,
                conn,
                answered_current: false,
            },
        );
    }

    pub fn participant_mut_by_conn(&mut self, conn_id: u64) -> Option<&mut Participant> {
        let name = self.by_conn.get(&conn_id)?.clone();
        self.participants.get_mut(&name)
    }

    /// Unbinds a closed connection from this room, whether it was the host or
    /// a participant. Removing a participant frees its name immediately.
    pub fn remove_conn(&mut self, conn_id: u64) {
        if self.host.as_ref().map(|host| host.id) == Some(conn_id) {
            self.host = None;
            tracing::info!(room_code = %self.code, "Host disconnected from room");
        }
        if let Some(name) = self.by_conn.remove(&conn_id) {
            self.participants.remove(&name);
            tracing::info!(room_code = %self.code, name = %name, "Participant left room");
        }
    }

    pub fn clear_answered_flags(&mut self) {
        for participant in self.participants.values_mut() {
            participant.answered_current = false;
        }
    }

    pub fn all_answered(&self) -> bool {
        self.participants
            .values()
            .all(|participant| participant.answered_current)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    /// The `question` event for the currently open round, used both for the
    /// round-open broadcast and for late-join catch-up.
    pub fn question_event(&self) -> Option<ServerMessage> {
        let started_at = self.round_started_at?;
        let question = self.current_question()?;
        Some(ServerMessage::Question {
            id: question.id,
            text: question.text.clone(),
            options: question.options.clone(),
            index: self.current_index + 1,
            total: self.questions.len(),
            starts_at: started_at,
            duration_ms: ROUND_DURATION_MS,
        })
    }

    /// Ranked standings: score descending, total time ascending on ties.
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings: Vec<Standing> = self
            .participants
            .values()
            .map(|participant| Standing {
                name: participant.name.clone(),
                score: participant.score,
                total_time_ms: participant.total_time_ms,
            })
            .collect();
        standings.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.total_time_ms.cmp(&b.total_time_ms))
        });
        standings
    }

    /// Delivers one event to the host (if bound) and every participant.
    pub fn broadcast(&self, message: &ServerMessage) {
        if let Some(host) = &self.host {
            host.send(message);
        }
        for participant in self.participants.values() {
            participant.conn.send(message);
        }
    }

    fn evictable(&self) -> bool {
        self.ended && self.host.is_none() && self.participants.is_empty()
    }
}

pub type SharedRoom = Arc<Mutex<RoomState>>;

/// Process-wide table of active rooms, keyed by room code. Room state is
/// created on first reference and dropped by the eviction sweep once the quiz
/// has ended and everyone has disconnected.
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, SharedRoom>>>,
}

impl RoomRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Idempotent: returns the existing room or allocates a new, empty one.
    pub async fn get_or_create(&self, code: &str) -> SharedRoom {
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(code) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(code.to_string())
            .or_insert_with(|| {
                tracing::debug!(room_code = %code, "Room state created");
                Arc::new(Mutex::new(RoomState::new(code)))
            })
            .clone()
    }

    pub async fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Removes a closed connection from every room it was bound to. The
    /// client gets no say in this; connections are weak references.
    pub async fn remove_connection(&self, conn_id: u64) {
        let rooms: Vec<SharedRoom> = self.rooms.read().await.values().cloned().collect();
        for shared in rooms {
            let mut room = shared.lock().await;
            room.remove_conn(conn_id);
        }
    }

    pub fn start_eviction(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        });
    }

    /// Drops rooms whose quiz has ended and whose host and participants have
    /// all disconnected, bounding memory in long-running deployments.
    pub(crate) async fn sweep(&self) {
        let candidates: Vec<(String, SharedRoom)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(code, room)| (code.clone(), room.clone()))
                .collect()
        };

        let mut evict = Vec::new();
        for (code, shared) in candidates {
            let room = shared.lock().await;
            if room.evictable() {
                evict.push(code);
            }
        }

        if !evict.is_empty() {
            let mut rooms = self.rooms.write().await;
            for code in evict {
                rooms.remove(&code);
                tracing::info!(room_code = %code, "Evicted finished room");
            }
        }
    }
}
