use async_trait::async_trait;

use super::transport::{TodoTransport, TransportError};
use crate::model::{ListId, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::store::TodoStore;

/// In-process [`TodoTransport`] that calls the store directly.
#[derive(Clone, Debug)]
pub struct StoreTransport {
    store: TodoStore,
}

impl StoreTransport {
    pub fn new(store: TodoStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TodoTransport for StoreTransport {
    async fn list(&self, list: &ListId) -> Result<Vec<TodoItem>, TransportError> {
        Ok(self.store.list_all(list).await?)
    }

    async fn create(&self, list: &ListId, todo: &NewTodo) -> Result<TodoItem, TransportError> {
        Ok(self.store.insert(list, todo.clone()).await?)
    }

    async fn update(
        &self,
        list: &ListId,
        id: TodoId,
        patch: &TodoPatch,
    ) -> Result<TodoItem, TransportError> {
        Ok(self.store.update_partial(list, id, patch.clone()).await?)
    }

    async fn move_between(
        &self,
        list: &ListId,
        from_id: TodoId,
        to_id: TodoId,
    ) -> Result<TodoItem, TransportError> {
        Ok(self
            .store
            .move_between_positions(list, from_id, to_id)
            .await?)
    }

    async fn delete(&self, list: &ListId, id: TodoId) -> Result<TodoItem, TransportError> {
        Ok(self.store.delete(list, id).await?)
    }
}
