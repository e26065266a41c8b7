//! In-memory stand-in for the todo endpoint
//!
//! Serves the four `/todos` routes the runner relies on, with numeric
//! ids handed out in creation order and listing in insertion order.
//! A failure switch lets tests make deletes answer `500`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;
use crate::types::{NewTodo, Todo, TodoId, TodoUpdate};

#[derive(Default)]
struct StubState {
    todos: Mutex<Vec<Todo>>,
    next_id: AtomicU64,
    fail_deletes: AtomicBool,
}

/// Handle to a running stub endpoint; stops serving when dropped
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Bind an ephemeral local port and start serving
    pub async fn start() -> Result<Self> {
        let state = Arc::new(StubState {
            next_id: AtomicU64::new(1),
            ..Default::default()
        });

        let app = Router::new()
            .route("/todos", get(list_handler).post(create_handler))
            .route("/todos/:id", put(update_handler).delete(delete_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        debug!("Stub todo endpoint listening on {}", addr);

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Current contents, in listing order
    pub fn todos(&self) -> Vec<Todo> {
        self.state.todos.lock().clone()
    }

    /// Insert a record directly, bypassing HTTP
    pub fn insert(&self, content: &str) -> Todo {
        let todo = Todo {
            id: TodoId::Number(self.state.next_id.fetch_add(1, Ordering::SeqCst)),
            content: content.to_string(),
            completed: false,
        };
        self.state.todos.lock().push(todo.clone());
        todo
    }

    /// Make every subsequent delete answer `500`
    pub fn fail_deletes(&self, fail: bool) {
        self.state.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn list_handler(State(state): State<Arc<StubState>>) -> impl IntoResponse {
    Json(state.todos.lock().clone())
}

async fn create_handler(
    State(state): State<Arc<StubState>>,
    Json(new): Json<NewTodo>,
) -> impl IntoResponse {
    let todo = Todo {
        id: TodoId::Number(state.next_id.fetch_add(1, Ordering::SeqCst)),
        content: new.content,
        completed: new.completed.unwrap_or(false),
    };
    state.todos.lock().push(todo.clone());
    (StatusCode::CREATED, Json(todo))
}

async fn update_handler(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    Json(update): Json<TodoUpdate>,
) -> impl IntoResponse {
    let mut todos = state.todos.lock();
    match todos.iter_mut().find(|t| t.id.to_string() == id) {
        Some(todo) => {
            update.apply(todo);
            (StatusCode::OK, Json(serde_json::to_value(&*todo).unwrap_or_default()))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("todo {} not found", id)})),
        ),
    }
}

async fn delete_handler(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.fail_deletes.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "delete disabled"})),
        );
    }

    let mut todos = state.todos.lock();
    let before = todos.len();
    todos.retain(|t| t.id.to_string() != id);
    if todos.len() == before {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("todo {} not found", id)})),
        );
    }
    (StatusCode::OK, Json(serde_json::json!({})))
}
