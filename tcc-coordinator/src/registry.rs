use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tcc_base::{Error, Result};
use tracing::debug;

use crate::component::{ComponentId, Participant};

/// In-memory table mapping component id to participant stub.
///
/// Registrations are rare (startup only) and lookups are frequent (once per
/// transaction per participant), so this is a multi-reader/single-writer
/// structure rather than anything fancier.
#[derive(Default)]
pub struct Registry {
    components: RwLock<HashMap<ComponentId, Arc<dyn Participant>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a participant. Fails with [`Error::DuplicateComponent`] if
    /// its id is already present.
    pub fn register(&self, participant: Arc<dyn Participant>) -> Result<()> {
        let id = participant.id();
        let mut components = self.components.write();
        if components.contains_key(&id) {
            return Err(Error::DuplicateComponent(id.to_string()));
        }
        debug!(component = %id, "registering participant");
        components.insert(id, participant);
        Ok(())
    }

    /// Resolve a list of component ids, in order. Fails with
    /// [`Error::UnknownComponent`] naming the first id not present.
    pub fn lookup(&self, ids: &[ComponentId]) -> Result<Vec<Arc<dyn Participant>>> {
        let components = self.components.read();
        ids.iter()
            .map(|id| {
                components
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::UnknownComponent(id.to_string()))
            })
            .collect()
    }
}
