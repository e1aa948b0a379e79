//! Optimistic deltas and the view they produce.
//!
//! The visible list is always `confirmed` (the last list the server returned)
//! with every still-pending [`Mutation`] replayed on top in issue order.
//! Dropping a pending mutation is therefore the whole of a rollback.

use std::collections::HashMap;

use crate::model::{ListId, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::ordering::{move_between, renumber};

/// One user mutation as it applies to the local list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create {
        temp_id: TodoId,
        todo: NewTodo,
        created_at: i64,
    },
    Update {
        id: TodoId,
        patch: TodoPatch,
    },
    Delete {
        id: TodoId,
    },
    Move {
        from_id: TodoId,
        to_id: TodoId,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete { .. } => "delete",
            Mutation::Move { .. } => "move",
        }
    }

    /// Ids this mutation needs the server to know about.
    pub fn referenced_ids(&self) -> Vec<TodoId> {
        match self {
            Mutation::Create { .. } => Vec::new(),
            Mutation::Update { id, .. } | Mutation::Delete { id } => vec![*id],
            Mutation::Move { from_id, to_id } => vec![*from_id, *to_id],
        }
    }

    /// Rewrites references to a temporary id once the server assigned one.
    pub fn remap(&mut self, temp_id: TodoId, real_id: TodoId) {
        let swap = |id: &mut TodoId| {
            if *id == temp_id {
                *id = real_id;
            }
        };
        match self {
            Mutation::Create { .. } => {}
            Mutation::Update { id, .. } | Mutation::Delete { id } => swap(id),
            Mutation::Move { from_id, to_id } => {
                swap(from_id);
                swap(to_id);
            }
        }
    }

    /// Replaces every referenced id found in `ids` with its mapped value.
    pub fn canonicalize(&mut self, ids: &HashMap<TodoId, TodoId>) {
        for id in self.referenced_ids() {
            if let Some(real) = ids.get(&id) {
                self.remap(id, *real);
            }
        }
    }

    /// Applies the expected effect to `items`. References to ids that are not
    /// present leave the list untouched.
    pub fn apply(&self, list: &ListId, items: &mut Vec<TodoItem>) {
        match self {
            Mutation::Create {
                temp_id,
                todo,
                created_at,
            } => {
                items.push(TodoItem {
                    id: *temp_id,
                    list_id: list.clone(),
                    headline: todo.headline.clone(),
                    description: todo.description.clone(),
                    done: todo.done,
                    position: items.len() as i64 + 1,
                    created_at: *created_at,
                });
            }
            Mutation::Update { id, patch } => {
                if let Some(item) = items.iter_mut().find(|item| item.id == *id) {
                    patch.apply_to(item);
                }
            }
            Mutation::Delete { id } => {
                items.retain(|item| item.id != *id);
                renumber(items);
            }
            Mutation::Move { from_id, to_id } => {
                let ids: Vec<TodoId> = items.iter().map(|item| item.id).collect();
                if let Ok(order) = move_between(&ids, from_id, to_id) {
                    reorder(items, &order);
                    renumber(items);
                }
            }
        }
    }

    /// Folds a confirmed mutation into `confirmed` using the row the server
    /// returned, for when the follow-up read did not succeed.
    pub fn fold_confirmed(&self, list: &ListId, confirmed: &mut Vec<TodoItem>, row: &TodoItem) {
        match self {
            Mutation::Create { .. } => {
                confirmed.retain(|item| item.id != row.id);
                confirmed.push(row.clone());
                confirmed.sort_by_key(|item| item.position);
            }
            Mutation::Update { .. } => {
                if let Some(item) = confirmed.iter_mut().find(|item| item.id == row.id) {
                    *item = row.clone();
                }
            }
            Mutation::Delete { .. } | Mutation::Move { .. } => self.apply(list, confirmed),
        }
    }
}

fn reorder(items: &mut Vec<TodoItem>, order: &[TodoId]) {
    let mut by_id: HashMap<TodoId, TodoItem> =
        items.drain(..).map(|item| (item.id, item)).collect();
    items.extend(order.iter().filter_map(|id| by_id.remove(id)));
}

/// A mutation issued but not yet settled, tagged with its issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub seq: u64,
    pub mutation: Mutation,
}

/// `confirmed` with every pending delta replayed in order.
pub fn replay(list: &ListId, confirmed: &[TodoItem], pending: &[PendingMutation]) -> Vec<TodoItem> {
    let mut items = confirmed.to_vec();
    for entry in pending {
        entry.mutation.apply(list, &mut items);
    }
    items
}

/// What the render path sees: a snapshot, never a live reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListView {
    pub list_id: ListId,
    /// Items in display order with dense positions.
    pub items: Vec<TodoItem>,
    /// Mutations still waiting for the server.
    pub pending: usize,
    /// Bumped each time server truth replaces the confirmed list.
    pub epoch: u64,
}

impl ListView {
    pub fn get(&self, id: TodoId) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn ids(&self) -> Vec<TodoId> {
        self.items.iter().map(|item| item.id).collect()
    }

    /// Unfinished items, order preserved.
    pub fn open_items(&self) -> Vec<&TodoItem> {
        self.items.iter().filter(|item| !item.done).collect()
    }

    pub fn is_settled(&self) -> bool {
        self.pending == 0
    }
}
