pub mod messages;
pub mod room;
mod server;

pub use server::QuizServer;

/// Fixed answer window for every question.
pub const ROUND_DURATION_MS: u64 = 60_000;

/// Points awarded for a correct answer inside the window.
pub const POINTS_PER_QUESTION: u32 = 10;

/// Milliseconds since the Unix epoch; the protocol exchanges wall-clock
/// timestamps so clients can render the remaining window.
pub(crate) fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
