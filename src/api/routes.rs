use std::convert::Infallible;
use std::sync::Arc;

use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::websocket;
use crate::quiz::QuizServer;
use crate::store::{QuestionInput, QuizStore};

/// All routes: the realtime websocket endpoint plus the HTTP CRUD surface
/// for rooms and questions.
pub fn routes(
    server: Arc<QuizServer>,
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    websocket_route(server)
        .or(health_check())
        .or(create_room(store.clone()))
        .or(room_exists(store.clone()))
        .or(create_room_with_code(store.clone()))
        .or(list_questions(store.clone()))
        .or(add_question(store))
}

fn websocket_route(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_server(server))
        .map(|ws: warp::ws::Ws, server: Arc<QuizServer>| {
            ws.on_upgrade(move |websocket| websocket::handle_websocket(websocket, server))
        })
}

fn health_check() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::json(&json!({
                "status": "healthy",
                "service": "Quiz Server",
                "version": "0.1.0"
            }))
        })
}

/// POST /api/rooms — allocate a fresh room code.
fn create_room(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms")
        .and(warp::post())
        .and(with_store(store))
        .and_then(create_room_handler)
}

/// GET /api/rooms/:code — room existence check.
fn room_exists(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms" / String)
        .and(warp::get())
        .and(with_store(store))
        .and_then(room_exists_handler)
}

/// POST /api/rooms/:code — create a room with a caller-chosen code.
fn create_room_with_code(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms" / String)
        .and(warp::post())
        .and(with_store(store))
        .and_then(create_room_with_code_handler)
}

/// GET /api/rooms/:code/questions
fn list_questions(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms" / String / "questions")
        .and(warp::get())
        .and(with_store(store))
        .and_then(list_questions_handler)
}

/// POST /api/rooms/:code/questions
fn add_question(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "rooms" / String / "questions")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_store(store))
        .and_then(add_question_handler)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    correct_index: Option<i64>,
}

async fn create_room_handler(store: Arc<dyn QuizStore>) -> Result<impl Reply, Infallible> {
    let room_code = generate_room_code();
    match store.create_room(&room_code).await {
        Ok(()) => {
            tracing::info!(room_code = %room_code, "Room created");
            Ok(json_reply(StatusCode::OK, &json!({ "roomCode": room_code })))
        }
        Err(error) => {
            tracing::error!(error = %error, "Failed to create room");
            Ok(internal_error())
        }
    }
}

async fn room_exists_handler(
    code: String,
    store: Arc<dyn QuizStore>,
) -> Result<impl Reply, Infallible> {
    match store.room_exists(&code).await {
        Ok(exists) => Ok(json_reply(StatusCode::OK, &json!({ "exists": exists }))),
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to check room");
            Ok(internal_error())
        }
    }
}

async fn create_room_with_code_handler(
    code: String,
    store: Arc<dyn QuizStore>,
) -> Result<impl Reply, Infallible> {
    match store.create_room(&code).await {
        Ok(()) => {
            tracing::info!(room_code = %code, "Room created");
            Ok(json_reply(StatusCode::OK, &json!({ "ok": true })))
        }
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to create room");
            Ok(internal_error())
        }
    }
}

async fn list_questions_handler(
    code: String,
    store: Arc<dyn QuizStore>,
) -> Result<impl Reply, Infallible> {
    match store.room_exists(&code).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(json_reply(
                StatusCode::NOT_FOUND,
                &json!({ "error": "Room not found." }),
            ));
        }
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to check room");
            return Ok(internal_error());
        }
    }

    match store.list_questions(&code).await {
        Ok(questions) => Ok(json_reply(StatusCode::OK, &json!({ "questions": questions }))),
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to list questions");
            Ok(internal_error())
        }
    }
}

async fn add_question_handler(
    code: String,
    body: QuestionBody,
    store: Arc<dyn QuizStore>,
) -> Result<impl Reply, Infallible> {
    match store.room_exists(&code).await {
        Ok(true) => {}
        Ok(false) => {
            return Ok(json_reply(
                StatusCode::NOT_FOUND,
                &json!({ "error": "Room not found." }),
            ));
        }
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to check room");
            return Ok(internal_error());
        }
    }

    let text = body.text.unwrap_or_default().trim().to_string();
    let options: Vec<String> = body
        .options
        .unwrap_or_default()
        .iter()
        .map(|option| option.trim().to_string())
        .collect();
    let correct_index = body.correct_index.unwrap_or(-1);

    if text.is_empty() || options.len() != 4 || options.iter().any(|option| option.is_empty()) {
        return Ok(json_reply(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "A question needs text and 4 non-empty options." }),
        ));
    }
    if !(0..=3).contains(&correct_index) {
        return Ok(json_reply(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "Correct option index must be between 0 and 3." }),
        ));
    }

    let input = QuestionInput {
        text,
        options,
        correct_index: correct_index as usize,
    };
    match store.add_question(&code, input).await {
        Ok(id) => {
            tracing::info!(room_code = %code, question_id = id, "Question added");
            Ok(json_reply(StatusCode::OK, &json!({ "ok": true })))
        }
        Err(error) => {
            tracing::error!(room_code = %code, error = %error, "Failed to add question");
            Ok(internal_error())
        }
    }
}

/// Opaque room codes: 6 uppercase hex characters.
fn generate_room_code() -> String {
    let bytes: [u8; 3] = rand::thread_rng().gen();
    bytes.iter().map(|byte| format!("{byte:02X}")).collect()
}

fn json_reply(
    status: StatusCode,
    body: &serde_json::Value,
) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn internal_error() -> warp::reply::WithStatus<warp::reply::Json> {
    json_reply(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({ "error": "Internal error." }),
    )
}

fn with_server(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = (Arc<QuizServer>,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

fn with_store(
    store: Arc<dyn QuizStore>,
) -> impl Filter<Extract = (Arc<dyn QuizStore>,), Error = Infallible> + Clone {
    warp::any().map(move || store.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_routes() -> (
        impl Filter<Extract = impl Reply, Error = Rejection> + Clone,
        Arc<MemoryStore>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let server = QuizServer::new(store.clone() as Arc<dyn QuizStore>);
        (routes(server, store.clone()), store)
    }

    #[test]
    fn test_room_code_format() {
        let code = generate_room_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (routes, _store) = test_routes();
        let response = warp::test::request().path("/health").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_create_room_returns_code() {
        let (routes, store) = test_routes();
        let response = warp::test::request()
            .method("POST")
            .path("/api/rooms")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        let code = body["roomCode"].as_str().unwrap();
        assert_eq!(code.len(), 6);
        assert!(store.room_exists(code).await.unwrap());
    }

    #[tokio::test]
    async fn test_room_exists_endpoint() {
        let (routes, store) = test_routes();
        store.create_room("AB12").await.unwrap();

        let response = warp::test::request().path("/api/rooms/AB12").reply(&routes).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["exists"], true);

        let response = warp::test::request().path("/api/rooms/ZZ99").reply(&routes).await;
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["exists"], false);
    }

    #[tokio::test]
    async fn test_add_question_validation() {
        let (routes, store) = test_routes();
        store.create_room("AB12").await.unwrap();

        // Too few options
        let response = warp::test::request()
            .method("POST")
            .path("/api/rooms/AB12/questions")
            .json(&json!({ "text": "2 + 2?", "options": ["3", "4"], "correctIndex": 1 }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Correct index out of range
        let response = warp::test::request()
            .method("POST")
            .path("/api/rooms/AB12/questions")
            .json(&json!({
                "text": "2 + 2?",
                "options": ["3", "4", "5", "6"],
                "correctIndex": 4
            }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Valid question
        let response = warp::test::request()
            .method("POST")
            .path("/api/rooms/AB12/questions")
            .json(&json!({
                "text": "2 + 2?",
                "options": ["3", "4", "5", "6"],
                "correctIndex": 1
            }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.list_questions("AB12").await.unwrap().len(), 1);

        // Unknown room
        let response = warp::test::request()
            .method("POST")
            .path("/api/rooms/ZZ99/questions")
            .json(&json!({
                "text": "2 + 2?",
                "options": ["3", "4", "5", "6"],
                "correctIndex": 1
            }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_questions_unknown_room_is_404() {
        let (routes, _store) = test_routes();
        let response = warp::test::request()
            .path("/api/rooms/ZZ99/questions")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
