use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::messages::{ClientMessage, Role, ServerMessage};
use super::room::{ConnHandle, RoomRegistry, RoomState, SharedRoom};
use super::{now_unix_ms, POINTS_PER_QUESTION, ROUND_DURATION_MS};
use crate::error::{QuizError, Result};
use crate::store::{QuizStore, ResponseRecord};

/// The realtime room orchestrator. Owns the room registry and applies every
/// inbound client event and timer callback to room state under that room's
/// mutex, so all clients observe mutations in a single, linear order.
pub struct QuizServer {
    registry: Arc<RoomRegistry>,
    store: Arc<dyn QuizStore>,
}

impl QuizServer {
    pub fn new(store: Arc<dyn QuizStore>) -> Arc<Self> {
        let registry = RoomRegistry::new();
        registry.clone().start_eviction();
        Arc::new(Self { registry, store })
    }

    /// Dispatches one inbound event. Rejections are reported only to the
    /// originating connection as an `error` event.
    pub async fn handle_message(&self, conn: &ConnHandle, message: ClientMessage) {
        let result = match message {
            ClientMessage::Join {
                role,
                room_code,
                name,
            } => self.handle_join(conn, role, &room_code, name).await,
            ClientMessage::HostStart { room_code } => self.handle_start(conn, &room_code).await,
            ClientMessage::HostNext { room_code } => self.handle_next(conn, &room_code).await,
            ClientMessage::Answer {
                room_code,
                question_id,
                option_index,
            } => {
                self.handle_answer(conn, &room_code, question_id, option_index)
                    .await
            }
        };

        if let Err(error) = result {
            if error.is_rejection() {
                tracing::debug!(conn_id = conn.id, error = %error, "Rejected client event");
            } else {
                tracing::error!(conn_id = conn.id, error = %error, "Failed to handle client event");
            }
            conn.send(&ServerMessage::Error {
                message: error.to_string(),
            });
        }
    }

    /// Unbinds a closed connection from every room.
    pub async fn disconnect(&self, conn: &ConnHandle) {
        self.registry.remove_connection(conn.id).await;
    }

    async fn handle_join(
        &self,
        conn: &ConnHandle,
        role: Role,
        room_code: &str,
        name: Option<String>,
    ) -> Result<()> {
        if !self.store.room_exists(room_code).await? {
            return Err(QuizError::RoomNotFound);
        }

        let shared = self.registry.get_or_create(room_code).await;
        let mut room = shared.lock().await;

        if role == Role::Host {
            // Single active host per room; a later host join wins.
            room.host = Some(conn.clone());
            tracing::info!(room_code = %room_code, conn_id = conn.id, "Host joined room");
            conn.send(&ServerMessage::RoomJoined {
                role: Role::Host,
                room_code: room_code.to_string(),
            });
            return Ok(());
        }

        let name = name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(QuizError::NameRequired);
        }
        if room.contains_name(&name) {
            return Err(QuizError::NameTaken);
        }

        room.add_participant(name.clone(), conn.clone());
        tracing::info!(room_code = %room_code, name = %name, "Participant joined room");
        conn.send(&ServerMessage::RoomJoined {
            role: Role::Participant,
            room_code: room_code.to_string(),
        });

        // Late joiners still receive the open question so they can answer
        // within the remaining window.
        if room.round_active {
            if let Some(event) = room.question_event() {
                conn.send(&event);
            }
        }

        Ok(())
    }

    async fn handle_start(&self, conn: &ConnHandle, room_code: &str) -> Result<()> {
        let shared = self.registry.get_or_create(room_code).await;
        let mut room = shared.lock().await;

        if room.host.as_ref().map(|host| host.id) != Some(conn.id) {
            return Err(QuizError::NotHost);
        }

        let mut questions = self.store.list_questions(room_code).await?;
        questions.sort_by_key(|question| question.position);
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }

        room.questions = questions;
        room.current_index = 0;
        room.ended = false;
        tracing::info!(
            room_code = %room_code,
            total = room.questions.len(),
            "Quiz started"
        );
        self.open_round(&shared, &mut room);
        Ok(())
    }

    async fn handle_next(&self, conn: &ConnHandle, room_code: &str) -> Result<()> {
        let shared = self.registry.get_or_create(room_code).await;
        let mut room = shared.lock().await;

        if room.host.as_ref().map(|host| host.id) != Some(conn.id) {
            return Err(QuizError::NotHost);
        }

        // Advance unconditionally: a round still in flight is abandoned and
        // its unanswered participants lose the chance to score it.
        room.current_index += 1;
        self.open_round(&shared, &mut room);
        Ok(())
    }

    /// Opens the round at `current_index`, or ends the quiz when the index is
    /// past the last question.
    fn open_round(&self, shared: &SharedRoom, room: &mut RoomState) {
        // Any timer armed for an earlier round becomes a no-op from here on.
        room.round_generation += 1;

        if room.current_index >= room.questions.len() {
            room.round_active = false;
            room.round_started_at = None;
            room.ended = true;
            room.clear_answered_flags();
            let standings = room.standings();
            tracing::info!(room_code = %room.code, "Quiz ended");
            room.broadcast(&ServerMessage::QuizEnded { standings });
            return;
        }

        room.round_active = true;
        room.round_started_at = Some(now_unix_ms());
        room.clear_answered_flags();

        tracing::info!(
            room_code = %room.code,
            index = room.current_index + 1,
            total = room.questions.len(),
            "Round opened"
        );
        if let Some(event) = room.question_event() {
            room.broadcast(&event);
        }

        let generation = room.round_generation;
        let shared = shared.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(ROUND_DURATION_MS)).await;
            let mut room = shared.lock().await;
            if room.round_active && room.round_generation == generation {
                tracing::debug!(room_code = %room.code, "Round timer expired");
                Self::close_round(&mut room);
            }
        });
    }

    /// Closes the open round and broadcasts the scoreboard. Reached either
    /// from timer expiry or from the last outstanding answer, never both.
    fn close_round(room: &mut RoomState) {
        room.round_active = false;
        room.round_started_at = None;
        // Cancels the pending timer for this round.
        room.round_generation += 1;
        room.clear_answered_flags();
        let standings = room.standings();
        tracing::info!(room_code = %room.code, "Round closed");
        room.broadcast(&ServerMessage::Scoreboard { standings });
    }

    /// Applies one participant answer. Stale submissions (closed round,
    /// unknown room or question, duplicate answer, non-participant socket)
    /// are expected races and ignored without an error event.
    async fn handle_answer(
        &self,
        conn: &ConnHandle,
        room_code: &str,
        question_id: i64,
        option_index: i64,
    ) -> Result<()> {
        let Some(shared) = self.registry.get(room_code).await else {
            return Ok(());
        };
        let mut room = shared.lock().await;

        if !room.round_active {
            return Ok(());
        }
        let Some(started_at) = room.round_started_at else {
            return Ok(());
        };
        let Some(question) = room
            .questions
            .iter()
            .find(|question| question.id == question_id)
            .cloned()
        else {
            return Ok(());
        };
        let Some(participant) = room.participant_mut_by_conn(conn.id) else {
            return Ok(());
        };
        if participant.answered_current {
            return Ok(());
        }

        let elapsed_ms = now_unix_ms().saturating_sub(started_at);
        // Set unconditionally: a late or wrong answer still consumes the
        // participant's single submission for this round.
        participant.answered_current = true;

        let within_window = elapsed_ms <= ROUND_DURATION_MS;
        let correct = within_window && option_index == question.correct_index as i64;
        if correct {
            participant.score += POINTS_PER_QUESTION;
            participant.total_time_ms += elapsed_ms;
        }
        let participant_name = participant.name.clone();

        tracing::debug!(
            room_code = %room_code,
            name = %participant_name,
            question_id = question_id,
            correct = correct,
            elapsed_ms = elapsed_ms,
            "Answer accepted"
        );

        // The response log write must never block the round state machine;
        // failures are surfaced to the operator through the log.
        let store = self.store.clone();
        let record = ResponseRecord {
            room_code: room_code.to_string(),
            question_id,
            participant_name,
            answer_index: option_index,
            is_correct: correct,
            time_ms: elapsed_ms,
        };
        tokio::spawn(async move {
            if let Err(error) = store.record_response(record).await {
                tracing::error!(error = %error, "Failed to persist response");
            }
        });

        if room.all_answered() {
            tracing::debug!(room_code = %room.code, "All participants answered, closing early");
            Self::close_round(&mut room);
        }

        Ok(())
    }
}
