use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Participant,
}

/// Inbound client events. Every variant carries the room code it targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        role: Role,
        room_code: String,
        #[serde(default)]
        name: Option<String>,
    },

    HostStart {
        room_code: String,
    },

    HostNext {
        room_code: String,
    },

    Answer {
        room_code: String,
        question_id: i64,
        option_index: i64,
    },
}

/// Outbound server events, fanned out to host and participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Error {
        message: String,
    },

    RoomJoined {
        role: Role,
        room_code: String,
    },

    Question {
        id: i64,
        text: String,
        options: Vec<String>,
        /// 1-based position within the quiz.
        index: usize,
        total: usize,
        starts_at: u64,
        duration_ms: u64,
    },

    Scoreboard {
        standings: Vec<Standing>,
    },

    QuizEnded {
        standings: Vec<Standing>,
    },
}

/// One scoreboard row: score descending, ties broken by total time ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub name: String,
    pub score: u32,
    pub total_time_ms: u64,
}
