//! In-process stand-in for the Telegram Bot API.

use std::{
    collections::VecDeque,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri},
        routing::post,
    },
    serde::Deserialize,
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

/// Body of a captured `copyMessage` call.
#[derive(Debug, Clone, Deserialize)]
pub struct CopyMessageRequest {
    pub chat_id: Value,
    pub from_chat_id: Value,
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
}

#[derive(Clone)]
struct ApiState {
    copies: Arc<Mutex<Vec<CopyMessageRequest>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
    failing_chats: Arc<Vec<i64>>,
}

pub struct MockTelegramApi {
    addr: SocketAddr,
    state: ApiState,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl MockTelegramApi {
    /// Start a server; `copyMessage` to any chat in `failing_chats` answers
    /// "chat not found".
    pub async fn start(failing_chats: Vec<i64>) -> Self {
        let state = ApiState {
            copies: Arc::default(),
            updates: Arc::default(),
            failing_chats: Arc::new(failing_chats),
        };
        let app = Router::new()
            .route("/{*path}", post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock telegram api");
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        }
    }

    pub fn bot(&self) -> teloxide::Bot {
        let api_url =
            reqwest::Url::parse(&format!("http://{}/", self.addr)).expect("parse api url");
        teloxide::Bot::new("test-token").set_api_url(api_url)
    }

    /// Queue a raw update for the next `getUpdates` call.
    pub fn push_update(&self, update: Value) {
        self.state
            .updates
            .lock()
            .expect("updates lock")
            .push_back(update);
    }

    pub fn copies(&self) -> Vec<CopyMessageRequest> {
        self.state.copies.lock().expect("copies lock").clone()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            let _ = server.await;
        }
    }
}

async fn handle(State(state): State<ApiState>, uri: Uri, body: Bytes) -> (StatusCode, Json<Value>) {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    match method.as_str() {
        "CopyMessage" => {
            let request: CopyMessageRequest =
                serde_json::from_slice(&body).expect("copyMessage body");
            let failing = request
                .chat_id
                .as_i64()
                .is_some_and(|id| state.failing_chats.contains(&id));
            state.copies.lock().expect("copies lock").push(request);
            if failing {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "ok": false,
                        "error_code": 400,
                        "description": "Bad Request: chat not found"
                    })),
                )
            } else {
                ok(json!({ "message_id": 99 }))
            }
        },
        "GetUpdates" => {
            let updates: Vec<Value> = state
                .updates
                .lock()
                .expect("updates lock")
                .drain(..)
                .collect();
            if updates.is_empty() {
                // Stand in for the long-poll wait.
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            ok(Value::Array(updates))
        },
        "GetMe" => ok(json!({
            "id": 1,
            "is_bot": true,
            "first_name": "Courier",
            "username": "courier_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": true,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false
        })),
        _ => ok(Value::Bool(true)),
    }
}

fn ok(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}
