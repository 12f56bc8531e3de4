//! Serializable work: actions and the registry that turns received parcels
//! back into runnable closures.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tandem_closure::TaskClosure;
use tracing::debug;

use crate::error::ApplierError;
use crate::parcel::Parcel;

/// A unit of work that can cross a locality boundary.
///
/// The value itself is the argument pack: it is encoded into a parcel on the
/// sending side and decoded and executed on the receiving side.
pub trait Action: Serialize + DeserializeOwned + Send + 'static {
    /// Wire name; must be unique among the actions a locality registers.
    const NAME: &'static str;

    fn execute(self);
}

/// Object-safe view of an [`Action`] held by a work descriptor.
pub trait ErasedAction: Send {
    fn name(&self) -> &'static str;

    fn encode(&self) -> Result<Vec<u8>, ApplierError>;

    /// Local execution path: runs the action once, then does nothing.
    fn into_closure(self: Box<Self>) -> TaskClosure<()>;
}

impl<A: Action> ErasedAction for A {
    fn name(&self) -> &'static str {
        A::NAME
    }

    fn encode(&self) -> Result<Vec<u8>, ApplierError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    fn into_closure(self: Box<Self>) -> TaskClosure<()> {
        let mut action = Some(*self);
        TaskClosure::new(move || {
            if let Some(action) = action.take() {
                action.execute();
            }
        })
    }
}

impl fmt::Debug for dyn ErasedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name()).finish()
    }
}

// ── ActionRegistry ──────────────────────────────────────────────────

type Decoder = fn(&[u8]) -> Result<TaskClosure<()>, ApplierError>;

fn decode_action<A: Action>(payload: &[u8]) -> Result<TaskClosure<()>, ApplierError> {
    let action: A = rmp_serde::from_slice(payload)?;
    Ok(Box::new(action).into_closure())
}

/// Maps action names to decoders for the parcels a locality can receive.
#[derive(Default)]
pub struct ActionRegistry {
    decoders: RwLock<HashMap<&'static str, Decoder>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `A` receivable. Returns `false` if it was already registered.
    pub fn register<A: Action>(&self) -> bool {
        let mut decoders = self.decoders.write().unwrap_or_else(PoisonError::into_inner);
        let fresh = decoders.insert(A::NAME, decode_action::<A>).is_none();
        if fresh {
            debug!(action = A::NAME, "action registered");
        }
        fresh
    }

    /// Chaining form of [`ActionRegistry::register`].
    pub fn with<A: Action>(self) -> Self {
        self.register::<A>();
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decoders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuild the closure a parcel carries.
    pub fn decode(&self, parcel: &Parcel) -> Result<TaskClosure<()>, ApplierError> {
        let decoder = self
            .decoders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(parcel.action.as_str())
            .copied()
            .ok_or_else(|| ApplierError::UnknownAction(parcel.action.clone()))?;
        decoder(&parcel.payload)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decoders = self.decoders.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = decoders.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry").field("actions", &names).finish()
    }
}
