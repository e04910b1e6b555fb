//! Layered variable scope
//!
//! Reads walk an explicit list of layers: frames innermost first (their
//! writable bag, then their parameters), session state, story metadata and
//! finally per-step extras. Unknown names read as null. Writes go to the
//! innermost frame that owns a writable bag, else to session state.

use serde_json::{Map, Value};

use super::session::Frame;
use crate::eval::Scope;
use crate::eval::path;

/// Scope view over a session's frames and state
pub struct LayeredScope<'a> {
    frames: &'a mut [Frame],
    state: &'a mut Map<String, Value>,
    meta: &'a Map<String, Value>,
    extras: &'a Map<String, Value>,
}

impl<'a> LayeredScope<'a> {
    /// Borrow the layers
    pub fn new(
        frames: &'a mut [Frame],
        state: &'a mut Map<String, Value>,
        meta: &'a Map<String, Value>,
        extras: &'a Map<String, Value>,
    ) -> Self {
        Self {
            frames,
            state,
            meta,
            extras,
        }
    }

    fn layers(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.scope.iter().chain(std::iter::once(&frame.params)))
            .chain([&*self.state, self.meta, self.extras])
    }
}

impl Scope for LayeredScope<'_> {
    fn lookup(&self, key: &str) -> Value {
        let root = path::root(key);
        self.layers()
            .find(|layer| layer.contains_key(root))
            .and_then(|layer| path::get_in(layer, key))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn assign(&mut self, key: &str, value: Value) {
        let target = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.scope.as_mut());
        match target {
            Some(bag) => path::set_in(bag, key, value),
            None => path::set_in(self.state, key, value),
        }
    }
}
