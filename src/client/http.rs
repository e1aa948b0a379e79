use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::transport::{TodoTransport, TransportError};
use crate::model::{ListId, MoveRequest, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::AppError;

/// [`TodoTransport`] over the JSON HTTP API.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn todos_url(&self, list: &ListId) -> String {
        format!("{}/api/lists/{}/todos", self.base_url, list)
    }

    fn todo_url(&self, list: &ListId, id: TodoId) -> String {
        format!("{}/{}", self.todos_url(list), id)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status();
        debug!(target: "todolist", event = "http_response", status = status.as_u16(), url = %response.url());
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| TransportError::Decode(err.to_string()));
        }
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        match serde_json::from_str::<AppError>(&body) {
            Ok(app_error) => Err(TransportError::Rejected(app_error)),
            Err(_) => Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[async_trait]
impl TodoTransport for HttpTransport {
    async fn list(&self, list: &ListId) -> Result<Vec<TodoItem>, TransportError> {
        self.send(self.client.get(self.todos_url(list))).await
    }

    async fn create(&self, list: &ListId, todo: &NewTodo) -> Result<TodoItem, TransportError> {
        self.send(self.client.post(self.todos_url(list)).json(todo))
            .await
    }

    async fn update(
        &self,
        list: &ListId,
        id: TodoId,
        patch: &TodoPatch,
    ) -> Result<TodoItem, TransportError> {
        self.send(self.client.patch(self.todo_url(list, id)).json(patch))
            .await
    }

    async fn move_between(
        &self,
        list: &ListId,
        from_id: TodoId,
        to_id: TodoId,
    ) -> Result<TodoItem, TransportError> {
        let url = format!("{}/move", self.todos_url(list));
        self.send(self.client.post(url).json(&MoveRequest { from_id, to_id }))
            .await
    }

    async fn delete(&self, list: &ListId, id: TodoId) -> Result<TodoItem, TransportError> {
        self.send(self.client.delete(self.todo_url(list, id))).await
    }
}
