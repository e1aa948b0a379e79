use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::optimistic::{replay, ListView, Mutation, PendingMutation};
use super::transport::TodoTransport;
use super::ClientError;
use crate::model::{validate_headline, ListId, NewTodo, TodoId, TodoItem, TodoPatch};
use crate::time::now_ms;

/// Result of one mutation, delivered once the server round-trip settles.
#[must_use = "a settlement reports whether the mutation reached the server"]
pub struct Settlement<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T> Settlement<T> {
    fn ready(result: Result<T, ClientError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    pub async fn wait(self) -> Result<T, ClientError> {
        self.rx.await.unwrap_or(Err(ClientError::Closed))
    }
}

enum Command {
    Settle {
        seq: u64,
        reply: oneshot::Sender<Result<TodoItem, ClientError>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<ListView, ClientError>>,
    },
    Shutdown,
}

struct ListState {
    list: ListId,
    confirmed: Vec<TodoItem>,
    pending: Vec<PendingMutation>,
    next_seq: u64,
    next_temp_id: TodoId,
    /// Temporary id to server id, for creates that have settled.
    created: HashMap<TodoId, TodoId>,
    epoch: u64,
}

impl ListState {
    fn new(list: ListId) -> Self {
        Self {
            list,
            confirmed: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
            next_temp_id: -1,
            created: HashMap::new(),
            epoch: 0,
        }
    }

    fn items(&self) -> Vec<TodoItem> {
        replay(&self.list, &self.confirmed, &self.pending)
    }

    fn view(&self) -> ListView {
        ListView {
            list_id: self.list.clone(),
            items: self.items(),
            pending: self.pending.len(),
            epoch: self.epoch,
        }
    }

    fn canonical(&self, id: TodoId) -> TodoId {
        self.created.get(&id).copied().unwrap_or(id)
    }

    fn take_temp_id(&mut self) -> TodoId {
        let id = self.next_temp_id;
        self.next_temp_id -= 1;
        id
    }

    fn push(&mut self, mut mutation: Mutation) -> u64 {
        mutation.canonicalize(&self.created);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingMutation { seq, mutation });
        seq
    }

    fn pending_mutation(&self, seq: u64) -> Option<Mutation> {
        self.pending
            .iter()
            .find(|entry| entry.seq == seq)
            .map(|entry| entry.mutation.clone())
    }

    fn drop_pending(&mut self, seq: u64) {
        self.pending.retain(|entry| entry.seq != seq);
    }

    fn record_created(&mut self, temp_id: TodoId, real_id: TodoId) {
        self.created.insert(temp_id, real_id);
        for entry in &mut self.pending {
            entry.mutation.remap(temp_id, real_id);
        }
    }

    /// Returns whether the confirmed list changed.
    fn replace_confirmed(&mut self, items: Vec<TodoItem>) -> bool {
        if self.confirmed == items {
            return false;
        }
        self.confirmed = items;
        self.epoch += 1;
        true
    }
}

struct Inner {
    state: Mutex<ListState>,
    view: watch::Sender<ListView>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &ListState) {
        self.view.send_replace(state.view());
    }
}

/// Optimistic view of one list.
///
/// Every mutation is applied to the visible list immediately, queued, and
/// sent by a single background task in issue order. After each request the
/// task re-reads the list and that read replaces the confirmed state, so the
/// newest completed read always wins. A failed request drops its delta, which
/// restores the last confirmed list.
pub struct ListController {
    inner: Arc<Inner>,
    commands: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl ListController {
    /// Starts the reconciliation task with an empty confirmed list. Must be
    /// called inside a Tokio runtime.
    pub fn spawn(transport: Arc<dyn TodoTransport>, list: ListId) -> Self {
        let state = ListState::new(list);
        let (view, _) = watch::channel(state.view());
        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            view,
        });
        let (commands, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(reconcile_loop(inner.clone(), transport, rx));
        Self {
            inner,
            commands,
            worker,
        }
    }

    /// Spawns a controller and waits for the first full read.
    pub async fn load(transport: Arc<dyn TodoTransport>, list: ListId) -> Result<Self, ClientError> {
        let controller = Self::spawn(transport, list);
        controller.refresh().wait().await?;
        Ok(controller)
    }

    pub fn list_id(&self) -> ListId {
        self.inner.lock().list.clone()
    }

    pub fn snapshot(&self) -> ListView {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListView> {
        self.inner.view.subscribe()
    }

    /// Appends a synthetic item with a negative temporary id, then creates it
    /// on the server. The settlement carries the server row.
    pub fn create(
        &self,
        headline: impl Into<String>,
        description: impl Into<String>,
    ) -> Settlement<TodoItem> {
        let headline = match validate_headline(&headline.into()) {
            Ok(headline) => headline,
            Err(err) => return Settlement::ready(Err(ClientError::Invalid(err))),
        };
        let todo = NewTodo::new(headline, description);
        self.enqueue(|state| {
            Ok(Mutation::Create {
                temp_id: state.take_temp_id(),
                todo,
                created_at: now_ms(),
            })
        })
    }

    /// Flips `done` for `id` as currently shown.
    pub fn toggle(&self, id: TodoId) -> Settlement<TodoItem> {
        self.enqueue(|state| {
            let id = state.canonical(id);
            let current = state
                .items()
                .into_iter()
                .find(|item| item.id == id)
                .ok_or(ClientError::UnknownItem(id))?;
            Ok(Mutation::Update {
                id,
                patch: TodoPatch::done(!current.done),
            })
        })
    }

    pub fn edit(&self, id: TodoId, patch: TodoPatch) -> Settlement<TodoItem> {
        let patch = match patch.validated() {
            Ok(patch) => patch,
            Err(err) => return Settlement::ready(Err(ClientError::Invalid(err))),
        };
        self.enqueue(|state| {
            let id = state.canonical(id);
            ensure_visible(state, id)?;
            Ok(Mutation::Update { id, patch })
        })
    }

    /// Removes the item locally, then deletes it on the server.
    pub fn delete(&self, id: TodoId) -> Settlement<TodoItem> {
        self.enqueue(|state| {
            let id = state.canonical(id);
            ensure_visible(state, id)?;
            Ok(Mutation::Delete { id })
        })
    }

    /// Moves `from_id` into the slot `to_id` holds in the current view.
    pub fn move_item(&self, from_id: TodoId, to_id: TodoId) -> Settlement<TodoItem> {
        self.enqueue(|state| {
            let from_id = state.canonical(from_id);
            let to_id = state.canonical(to_id);
            if from_id == to_id {
                return Err(ClientError::InvalidMove);
            }
            ensure_visible(state, from_id)?;
            ensure_visible(state, to_id)?;
            Ok(Mutation::Move { from_id, to_id })
        })
    }

    /// Queues a full re-read behind every mutation already issued.
    pub fn refresh(&self) -> Settlement<ListView> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Refresh { reply }).is_err() {
            return Settlement::ready(Err(ClientError::Closed));
        }
        Settlement { rx }
    }

    /// Replaces the confirmed list with `items` as read from the server.
    ///
    /// Returns whether the visible list changed; applying the same items again
    /// is a no-op.
    pub fn apply_server_truth(&self, items: Vec<TodoItem>) -> bool {
        let mut state = self.inner.lock();
        let before = state.view();
        state.replace_confirmed(items);
        let after = state.view();
        if before == after {
            return false;
        }
        self.inner.view.send_replace(after);
        true
    }

    /// Lets queued mutations settle, then stops the reconciliation task.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(err) = self.worker.await {
            warn!(target: "todolist", event = "client_worker_failed", error = %err);
        }
    }

    fn enqueue<F>(&self, build: F) -> Settlement<TodoItem>
    where
        F: FnOnce(&mut ListState) -> Result<Mutation, ClientError>,
    {
        let (reply, rx) = oneshot::channel();
        let mut state = self.inner.lock();
        let mutation = match build(&mut *state) {
            Ok(mutation) => mutation,
            Err(err) => return Settlement::ready(Err(err)),
        };
        let op = mutation.name();
        let seq = state.push(mutation);
        if self.commands.send(Command::Settle { seq, reply }).is_err() {
            state.drop_pending(seq);
            return Settlement::ready(Err(ClientError::Closed));
        }
        self.inner.publish(&state);
        debug!(target: "todolist", event = "client_optimistic", list_id = %state.list, seq, op);
        Settlement { rx }
    }
}

fn ensure_visible(state: &ListState, id: TodoId) -> Result<(), ClientError> {
    if state.items().iter().any(|item| item.id == id) {
        Ok(())
    } else {
        Err(ClientError::UnknownItem(id))
    }
}

async fn reconcile_loop(
    inner: Arc<Inner>,
    transport: Arc<dyn TodoTransport>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Settle { seq, reply } => {
                let result = settle(&inner, transport.as_ref(), seq).await;
                let _ = reply.send(result);
            }
            Command::Refresh { reply } => {
                let _ = reply.send(refresh(&inner, transport.as_ref()).await);
            }
            Command::Shutdown => break,
        }
    }
    debug!(target: "todolist", event = "client_worker_stopped");
}

async fn refresh(inner: &Inner, transport: &dyn TodoTransport) -> Result<ListView, ClientError> {
    let list = inner.lock().list.clone();
    let items = transport.list(&list).await?;
    let mut state = inner.lock();
    state.replace_confirmed(items);
    inner.publish(&state);
    Ok(state.view())
}

/// Sends one pending mutation, re-reads, and replaces the confirmed list.
async fn settle(inner: &Inner, transport: &dyn TodoTransport, seq: u64) -> Result<TodoItem, ClientError> {
    let (list, mutation) = {
        let state = inner.lock();
        let mutation = state.pending_mutation(seq).ok_or(ClientError::Closed)?;
        (state.list.clone(), mutation)
    };

    // A reference to a temporary id that never got a server id means the
    // create it came from failed; the delta cannot be sent.
    if let Some(orphan) = mutation.referenced_ids().into_iter().find(|id| *id < 0) {
        let mut state = inner.lock();
        state.drop_pending(seq);
        inner.publish(&state);
        warn!(target: "todolist", event = "client_rollback", list_id = %list, seq, op = mutation.name(), reason = "unknown_item");
        return Err(ClientError::UnknownItem(orphan));
    }

    let outcome = match &mutation {
        Mutation::Create { todo, .. } => transport.create(&list, todo).await,
        Mutation::Update { id, patch } => transport.update(&list, *id, patch).await,
        Mutation::Delete { id } => transport.delete(&list, *id).await,
        Mutation::Move { from_id, to_id } => transport.move_between(&list, *from_id, *to_id).await,
    };

    if let (Ok(row), Mutation::Create { temp_id, .. }) = (&outcome, &mutation) {
        inner.lock().record_created(*temp_id, row.id);
    }

    let truth = transport.list(&list).await;

    let mut state = inner.lock();
    state.drop_pending(seq);
    match (&outcome, truth) {
        (_, Ok(items)) => {
            state.replace_confirmed(items);
        }
        (Ok(row), Err(err)) => {
            warn!(target: "todolist", event = "client_reread_failed", list_id = %list, seq, error = %err);
            let list = state.list.clone();
            let mut confirmed = std::mem::take(&mut state.confirmed);
            mutation.fold_confirmed(&list, &mut confirmed, row);
            state.confirmed = confirmed;
            state.epoch += 1;
        }
        (Err(_), Err(err)) => {
            warn!(target: "todolist", event = "client_reread_failed", list_id = %list, seq, error = %err);
        }
    }
    inner.publish(&state);
    drop(state);

    match outcome {
        Ok(row) => {
            info!(target: "todolist", event = "client_settled", list_id = %list, seq, op = mutation.name(), id = row.id);
            Ok(row)
        }
        Err(err) => {
            warn!(target: "todolist", event = "client_rollback", list_id = %list, seq, op = mutation.name(), error = %err);
            Err(ClientError::Transport(err))
        }
    }
}
