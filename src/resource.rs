//! Resource handles for async CRUD with state management.
//!
//! A `Resource<T, C>` owns the request state for one endpoint, spawns CRUD
//! operations against the injected transport, and keeps the shared
//! collection cache in sync with every successful request. Drive it from an
//! event loop: invoke operations, then `poll()` each tick and re-render when
//! it reports a change.
//!
//! # Example
//!
//! ```ignore
//! let caches = Arc::new(CacheContainer::new());
//! let transport = HttpTransport::new("https://api.example.com")?;
//! let mut users: Resource<User, _> =
//!     Resource::new(ApiQuery::new("users"), transport, caches);
//!
//! // In event loop tick
//! if users.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! if users.is_loading() {
//!     render_spinner();
//! }
//! if let Some(records) = users.data() {
//!     render_rows(records);
//! }
//!
//! // On user input
//! users.create(new_user);
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use crate::cache::CacheContainer;
use crate::error::ApiError;
use crate::query::ApiQuery;
use crate::record::Record;
use crate::state::{Action, CrudHandles, RequestState};
use crate::transport::Transport;

/// Shared context visible to every spawned operation: the current query, the
/// merge base, the cache container, and the channel back to the state.
struct OpContext<T: Record, C: Transport> {
  transport: C,
  caches: Arc<CacheContainer>,
  query: Mutex<ApiQuery>,
  /// Last list dispatched as `Data`. Operations snapshot it at invocation.
  latest: Mutex<Option<Vec<T>>>,
  tx: mpsc::UnboundedSender<Action<T>>,
  cancelled: AtomicBool,
}

impl<T: Record, C: Transport> OpContext<T, C> {
  fn dispatch(&self, action: Action<T>) {
    if let Action::Data(records) = &action {
      *lock(&self.latest) = Some(records.clone());
    }
    // Ignore send errors - receiver may have been dropped
    let _ = self.tx.send(action);
  }

  /// Dispatch unless the owning resource was torn down. Guards only the
  /// initial fetch's final success dispatch; mutation dispatches are
  /// deliberately unguarded.
  fn dispatch_unless_cancelled(&self, action: Action<T>) {
    if self.cancelled.load(Ordering::SeqCst) {
      debug!("Suppressing dispatch after teardown");
      return;
    }
    self.dispatch(action);
  }

  fn current_query(&self) -> ApiQuery {
    lock(&self.query).clone()
  }

  /// Write `records` into the cache for `endpoint`. The target collection is
  /// resolved from the container by endpoint; an operation that finishes
  /// after `set_query` writes the collection it was invoked for.
  fn write_cache(&self, endpoint: &str, records: &[T]) {
    let handle = self.caches.get_cache::<T>(endpoint);
    lock(&handle).set(endpoint, records.to_vec());
  }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Stateful handle for one resource collection.
///
/// Mounting adopts the cached collection for the endpoint when the shared
/// container has one, otherwise it fetches. Every successful operation
/// rewrites the cache entry before dispatching, so the cache and the state
/// agree whenever `poll` has drained.
///
/// Known limitation: overlapping mutations on one endpoint race; each
/// operation merges into the list snapshot taken at its invocation, so the
/// last to resolve wins and may drop an earlier overlap's effect.
pub struct Resource<T: Record, C: Transport> {
  state: RequestState<T>,
  rx: mpsc::UnboundedReceiver<Action<T>>,
  ctx: Arc<OpContext<T, C>>,
}

impl<T: Record, C: Transport> Resource<T, C> {
  /// Mount a resource inside a tokio runtime.
  ///
  /// Attaches the CRUD handles, then either adopts the cached collection for
  /// `query.endpoint` synchronously or spawns the initial fetch.
  pub fn new(query: ApiQuery, transport: C, caches: Arc<CacheContainer>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let ctx = Arc::new(OpContext {
      transport,
      caches,
      query: Mutex::new(query),
      latest: Mutex::new(None),
      tx,
      cancelled: AtomicBool::new(false),
    });

    let mut resource = Self {
      state: RequestState::new(),
      rx,
      ctx,
    };
    resource
      .state
      .apply(Action::Init(make_handles(&resource.ctx)));
    resource.mount();

    resource
  }

  /// Adopt the cached collection when the container has one, else fetch.
  fn mount(&mut self) {
    let endpoint = lock(&self.ctx.query).endpoint.clone();
    let handle = self.ctx.caches.get_cache::<T>(&endpoint);
    let cached = lock(&handle).get(&endpoint);

    match cached {
      Some(records) => {
        // Warm mount: adopt synchronously, skip the network round-trip
        self.ctx.dispatch(Action::Data(records));
        self.poll();
      }
      None => self.refetch(),
    }
  }

  /// Drain pending dispatches into the state, strictly in dispatch order.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(action) = self.rx.try_recv() {
      self.state.apply(action);
      changed = true;
    }
    changed
  }

  /// Force a fetch of the full collection for the current query.
  pub fn refetch(&self) {
    let query = self.ctx.current_query();
    tokio::spawn(run_load(Arc::clone(&self.ctx), query));
  }

  /// Create `record` on the backend and append the returned record to the
  /// collection.
  pub fn create(&self, record: T) {
    if let Some(handles) = &self.state.handles {
      (handles.create)(record);
    }
  }

  /// Replace `record` on the backend and swap the returned record in by id.
  pub fn edit(&self, record: T) {
    if let Some(handles) = &self.state.handles {
      (handles.edit)(record);
    }
  }

  /// Delete `record` on the backend and drop the matching record by id.
  pub fn delete(&self, record: T) {
    if let Some(handles) = &self.state.handles {
      (handles.delete)(record);
    }
  }

  /// Re-fetch a single record with the current query and merge it in by id.
  pub fn get(&self) {
    if let Some(handles) = &self.state.handles {
      (handles.get)();
    }
  }

  /// Replace the query descriptor.
  ///
  /// Changing the endpoint re-fetches; an unchanged endpoint re-fetches only
  /// when the cache has nothing for it.
  pub fn set_query(&mut self, query: ApiQuery) {
    let endpoint = query.endpoint.clone();
    let endpoint_changed = {
      let mut current = lock(&self.ctx.query);
      let changed = current.endpoint != endpoint;
      *current = query;
      changed
    };

    let handle = self.ctx.caches.get_cache::<T>(&endpoint);
    let cache_missing = lock(&handle).get(&endpoint).is_none();

    if endpoint_changed || cache_missing {
      self.refetch();
    }
  }

  /// Current query descriptor.
  pub fn query(&self) -> ApiQuery {
    self.ctx.current_query()
  }

  /// Current request state.
  pub fn state(&self) -> &RequestState<T> {
    &self.state
  }

  /// The collection, once any request has succeeded.
  pub fn data(&self) -> Option<&[T]> {
    self.state.data.as_deref()
  }

  /// Accumulated request failures.
  pub fn errors(&self) -> Option<&[ApiError]> {
    self.state.errors.as_deref()
  }

  /// Whether an operation is in flight.
  pub fn is_loading(&self) -> bool {
    self.state.loading
  }

  /// Suppress the initial fetch's pending success dispatch. Idempotent;
  /// also runs on drop.
  pub fn cancel(&self) {
    self.ctx.cancelled.store(true, Ordering::SeqCst);
  }
}

impl<T: Record, C: Transport> Drop for Resource<T, C> {
  fn drop(&mut self) {
    self.cancel();
  }
}

impl<T: Record + fmt::Debug, C: Transport> fmt::Debug for Resource<T, C> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Resource")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}

fn make_handles<T: Record, C: Transport>(ctx: &Arc<OpContext<T, C>>) -> CrudHandles<T> {
  let create = {
    let ctx = Arc::clone(ctx);
    Arc::new(move |record: T| spawn_op(&ctx, CrudOp::Create, Some(record)))
  };
  let edit = {
    let ctx = Arc::clone(ctx);
    Arc::new(move |record: T| spawn_op(&ctx, CrudOp::Edit, Some(record)))
  };
  let delete = {
    let ctx = Arc::clone(ctx);
    Arc::new(move |record: T| spawn_op(&ctx, CrudOp::Delete, Some(record)))
  };
  let get = {
    let ctx = Arc::clone(ctx);
    Arc::new(move || spawn_op(&ctx, CrudOp::Refresh, None))
  };

  CrudHandles {
    create,
    edit,
    delete,
    get,
  }
}

#[derive(Clone, Copy)]
enum CrudOp {
  Create,
  Edit,
  Delete,
  Refresh,
}

fn spawn_op<T: Record, C: Transport>(ctx: &Arc<OpContext<T, C>>, op: CrudOp, record: Option<T>) {
  // Merge base and query are captured at invocation, not at resolution;
  // overlapping operations resolve last-write-wins.
  let snapshot = lock(&ctx.latest).clone().unwrap_or_default();
  let query = ctx.current_query();
  tokio::spawn(run_op(Arc::clone(ctx), op, query, record, snapshot));
}

/// Initial or forced fetch of the whole collection.
async fn run_load<T: Record, C: Transport>(ctx: Arc<OpContext<T, C>>, query: ApiQuery) {
  ctx.dispatch(Action::Loading);

  match ctx.transport.get_all(&query).await {
    Ok(body) => match decode_list::<T>(body) {
      Ok(records) => {
        ctx.write_cache(&query.endpoint, &records);
        ctx.dispatch_unless_cancelled(Action::Data(records));
      }
      Err(error) => ctx.dispatch(Action::Error(error)),
    },
    Err(error) => ctx.dispatch(Action::Error(error)),
  }
}

/// One mutation or single-record refresh: request, merge, cache, dispatch.
async fn run_op<T: Record, C: Transport>(
  ctx: Arc<OpContext<T, C>>,
  op: CrudOp,
  mut query: ApiQuery,
  record: Option<T>,
  snapshot: Vec<T>,
) {
  ctx.dispatch(Action::Loading);

  if let Some(record) = &record {
    match serde_json::to_value(record) {
      Ok(value) => query.data = Some(value),
      Err(e) => {
        ctx.dispatch(Action::Error(ApiError::client(format!(
          "Failed to encode payload: {}",
          e
        ))));
        return;
      }
    }
  }

  let result = match op {
    CrudOp::Create => ctx.transport.post(&query).await,
    CrudOp::Edit => ctx.transport.put(&query).await,
    CrudOp::Delete => ctx.transport.delete(&query).await,
    CrudOp::Refresh => ctx.transport.get(&query).await,
  };

  let body = match result {
    Ok(body) => body,
    Err(error) => {
      ctx.dispatch(Action::Error(error));
      return;
    }
  };

  match merge_response(op, snapshot, body, record.as_ref()) {
    Ok(records) => {
      ctx.write_cache(&query.endpoint, &records);
      ctx.dispatch(Action::Data(records));
    }
    Err(error) => ctx.dispatch(Action::Error(error)),
  }
}

/// Fold one successful response into the snapshot list.
///
/// Create appends the returned record; edit and refresh replace the record
/// with the matching id, leaving the list untouched when nothing matches;
/// delete drops by the response's id, falling back to the sent record's id
/// for empty 204-style bodies.
fn merge_response<T: Record>(
  op: CrudOp,
  snapshot: Vec<T>,
  body: Value,
  sent: Option<&T>,
) -> Result<Vec<T>, ApiError> {
  let mut records = snapshot;

  match op {
    CrudOp::Create => {
      records.push(decode_record(body)?);
    }
    CrudOp::Edit | CrudOp::Refresh => {
      let returned: T = decode_record(body)?;
      if let Some(existing) = records.iter_mut().find(|r| r.id() == returned.id()) {
        *existing = returned;
      }
    }
    CrudOp::Delete => {
      let id = body
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| sent.map(|r| r.id().to_string()));
      if let Some(id) = id {
        records.retain(|r| r.id() != id);
      }
    }
  }

  Ok(records)
}

fn decode_record<T: Record>(body: Value) -> Result<T, ApiError> {
  serde_json::from_value(body)
    .map_err(|e| ApiError::client(format!("Failed to decode response record: {}", e)))
}

fn decode_list<T: Record>(body: Value) -> Result<Vec<T>, ApiError> {
  serde_json::from_value(body)
    .map_err(|e| ApiError::client(format!("Failed to decode response collection: {}", e)))
}
