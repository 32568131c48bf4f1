//! Request state machine driven by dispatched actions.

use std::fmt;
use std::sync::Arc;

use crate::error::ApiError;

/// Callback handle that launches one CRUD operation with a record payload.
pub type OpFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Callback handle that launches the single-record refresh operation.
pub type RefreshFn = Arc<dyn Fn() + Send + Sync>;

/// The four CRUD launchers attached to the state by [`Action::Init`].
///
/// Handles are cheap to clone and fire-and-forget: each spawns its operation
/// against the query the owning resource currently points at. They stay
/// callable after the resource is gone; dispatches then land in a dropped
/// channel and are absorbed.
#[derive(Clone)]
pub struct CrudHandles<T> {
  pub create: OpFn<T>,
  pub edit: OpFn<T>,
  pub delete: OpFn<T>,
  pub get: RefreshFn,
}

impl<T> fmt::Debug for CrudHandles<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CrudHandles").finish_non_exhaustive()
  }
}

/// Discrete inputs to the request state machine.
#[derive(Debug, Clone)]
pub enum Action<T> {
  /// A request went out: raise the loading flag, touch nothing else.
  Loading,
  /// A request succeeded with a full reconciled list.
  Data(Vec<T>),
  /// A request failed: the error joins the log, loading drops.
  Error(ApiError),
  /// Attach the CRUD launchers. Dispatched once when the resource mounts.
  Init(CrudHandles<T>),
}

/// Per-query request state.
///
/// The fields are overlays, not mutually exclusive states: a re-fetch over
/// stale data keeps `data` populated while `loading` is true, and `errors`
/// accumulates across requests until the state is dropped. Transitions
/// happen only through [`RequestState::apply`].
#[derive(Debug, Clone)]
pub struct RequestState<T> {
  /// True from each operation launch until its terminal dispatch.
  pub loading: bool,
  /// Most recently reconciled collection, once any request has succeeded.
  pub data: Option<Vec<T>>,
  /// Append-only log of request failures.
  pub errors: Option<Vec<ApiError>>,
  /// CRUD launchers, present once `Init` has been applied.
  pub handles: Option<CrudHandles<T>>,
}

impl<T> RequestState<T> {
  /// The initial state: nothing loading, nothing known.
  pub fn new() -> Self {
    Self::default()
  }

  /// Fold one action into the state.
  ///
  /// Infallible: every action has a defined effect from every state, and the
  /// machine has no terminal state.
  pub fn apply(&mut self, action: Action<T>) {
    match action {
      Action::Loading => {
        self.loading = true;
      }
      Action::Data(records) => {
        self.data = Some(records);
        self.loading = false;
      }
      Action::Error(error) => {
        self.errors.get_or_insert_with(Vec::new).push(error);
        self.loading = false;
      }
      Action::Init(handles) => {
        self.handles = Some(handles);
      }
    }
  }
}

impl<T> Default for RequestState<T> {
  fn default() -> Self {
    Self {
      loading: false,
      data: None,
      errors: None,
      handles: None,
    }
  }
}
