//! [`ControllerComposer`] – the set of machines the supervisor may run.
//!
//! `add`/`remove` take a short write lock on the list only; they never wait
//! on a machine's tick.  The composer does not arbitrate the actuator: the
//! supervisor keeps exactly one member running.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::periodic::Controller;

#[derive(Default)]
pub struct ControllerComposer {
    controllers: RwLock<Vec<Arc<dyn Controller>>>,
}

impl ControllerComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller`.  Returns `false` if one with the same name is
    /// already present.
    pub fn add(&self, controller: Arc<dyn Controller>) -> bool {
        let mut list = self.controllers.write().unwrap_or_else(PoisonError::into_inner);
        if list.iter().any(|c| c.name() == controller.name()) {
            debug!(machine = controller.name(), "already composed");
            return false;
        }
        info!(machine = controller.name(), "controller added");
        list.push(controller);
        true
    }

    /// Unregister by name.  The controller is returned as-is; stopping it is
    /// the caller's decision.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Controller>> {
        let mut list = self.controllers.write().unwrap_or_else(PoisonError::into_inner);
        let idx = list.iter().position(|c| c.name() == name)?;
        info!(machine = name, "controller removed");
        Some(list.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Controller>> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.name().to_string()).collect()
    }

    /// Names of members currently ticking.
    pub fn running(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .filter(|c| c.is_running())
            .map(|c| c.name().to_string())
            .collect()
    }

    /// Stop every member.  The list lock is released before any `stop` runs.
    pub fn stop_all(&self) {
        for controller in self.snapshot() {
            controller.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.controllers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn Controller>> {
        self.controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
