//! Agent state and the reducers that merge partial updates into it.
//!
//! Steps never mutate state directly.  They return a [`StatePatch`] and the
//! engine folds it into the accumulated [`AgentState`] through the agent's
//! [`StateReducer`].  The `messages` field always appends; every other field
//! uses a registered [`FieldReducer`] or falls back to last-write-wins.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::Message;

// ---------------------------------------------------------------------------
// State and patches
// ---------------------------------------------------------------------------

/// Accumulated state of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    /// Conversation history, in arrival order.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Every other state field.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl AgentState {
    /// The most recent message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Look up a non-message field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A partial state update returned by a step.
///
/// A field that is absent from the patch is "undefined".  Unregistered
/// fields keep their previous value; registered reducers still run with no
/// incoming value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Messages to append.
    pub messages: Option<Vec<Message>>,

    /// Other fields to merge.
    pub fields: Map<String, Value>,
}

impl StatePatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch appending `messages`.
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            fields: Map::new(),
        }
    }

    /// Append one more message to the patch.
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.get_or_insert_with(Vec::new).push(message);
        self
    }

    /// Set a non-message field.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.messages.is_none() && self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reducers
// ---------------------------------------------------------------------------

/// Merge function for one state field: `(incoming, previous) -> merged`.
///
/// `None` stands for "undefined".  Returning `None` removes the field.
/// Reducers must be pure and total.
pub type FieldReducer = Arc<dyn Fn(Option<Value>, Option<&Value>) -> Option<Value> + Send + Sync>;

/// Append `incoming` after `previous`, preserving arrival order.
pub fn append_messages(incoming: Option<Vec<Message>>, mut previous: Vec<Message>) -> Vec<Message> {
    if let Some(incoming) = incoming {
        previous.extend(incoming);
    }
    previous
}

/// Default merge for fields without a registered reducer.
pub fn last_write_wins(incoming: Option<Value>, previous: Option<&Value>) -> Option<Value> {
    incoming.or_else(|| previous.cloned())
}

/// Concatenate JSON arrays.  A non-array operand is treated as a
/// one-element array.
pub fn append_array(incoming: Option<Value>, previous: Option<&Value>) -> Option<Value> {
    fn items(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            other => vec![other],
        }
    }

    match (incoming, previous) {
        (None, previous) => previous.cloned(),
        (Some(incoming), None) => Some(Value::Array(items(incoming))),
        (Some(incoming), Some(previous)) => {
            let mut merged = items(previous.clone());
            merged.extend(items(incoming));
            Some(Value::Array(merged))
        }
    }
}

/// Per-field merge table for an agent's state.
#[derive(Clone, Default)]
pub struct StateReducer {
    fields: HashMap<String, FieldReducer>,
}

impl StateReducer {
    /// A reducer with only the built-in behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer for `name`.
    pub fn with_field<F>(mut self, name: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(Option<Value>, Option<&Value>) -> Option<Value> + Send + Sync + 'static,
    {
        self.fields.insert(name.into(), Arc::new(reducer));
        self
    }

    /// Whether a reducer is registered for `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Merge a single field value.
    pub fn reduce_field(&self, name: &str, incoming: Option<Value>, previous: Option<&Value>) -> Option<Value> {
        match self.fields.get(name) {
            Some(reducer) => reducer(incoming, previous),
            None => last_write_wins(incoming, previous),
        }
    }

    /// Fold `patch` into `state`.
    ///
    /// Every registered reducer runs on every merge, whether or not the patch
    /// carries its field.
    pub fn apply(&self, state: &mut AgentState, patch: StatePatch) {
        let previous = std::mem::take(&mut state.messages);
        state.messages = append_messages(patch.messages, previous);

        let mut incoming_fields = patch.fields;
        let names: BTreeSet<String> = self
            .fields
            .keys()
            .chain(incoming_fields.keys())
            .cloned()
            .collect();

        for name in names {
            let incoming = incoming_fields.remove(&name);
            match self.reduce_field(&name, incoming, state.fields.get(&name)) {
                Some(merged) => {
                    state.fields.insert(name, merged);
                }
                None => {
                    state.fields.remove(&name);
                }
            }
        }
    }
}

impl fmt::Debug for StateReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.fields.keys().collect();
        names.sort();
        f.debug_struct("StateReducer")
            .field("fields", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
