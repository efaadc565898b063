use crate::error::GearError;
use crate::gear::hal::{ParamId, ParameterStore};
use crate::gear::state::{factory_default, Identity};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

struct StoreCtxt {
    values: HashMap<ParamId, u8>,
    // Writes to these are rejected
    failing: HashSet<ParamId>,
    writes: usize,
}

/// Non-volatile parameter memory kept in RAM. Clones share the same
/// memory so a test can inspect what the gear persisted.
#[derive(Clone)]
pub struct MemoryParameterStore {
    identity: Identity,
    ctxt: Arc<Mutex<StoreCtxt>>,
}

impl MemoryParameterStore {
    pub fn new(identity: Identity) -> MemoryParameterStore {
        let values = ParamId::all()
            .map(|id| (id, factory_default(id, &identity)))
            .collect();
        MemoryParameterStore {
            identity,
            ctxt: Arc::new(Mutex::new(StoreCtxt {
                values,
                failing: HashSet::new(),
                writes: 0,
            })),
        }
    }

    /// Set a value directly, as if programmed at the factory
    pub fn preset(&self, id: ParamId, value: u8) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.values.insert(id, value);
        }
    }

    pub fn value(&self, id: ParamId) -> Option<u8> {
        self.ctxt.lock().ok()?.values.get(&id).copied()
    }

    /// Reject every later write of `id`
    pub fn fail_put(&self, id: ParamId) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.failing.insert(id);
        }
    }

    pub fn write_count(&self) -> usize {
        self.ctxt.lock().map(|c| c.writes).unwrap_or(0)
    }
}

impl ParameterStore for MemoryParameterStore {
    fn get(&self, id: ParamId) -> Result<u8, GearError> {
        self.value(id).ok_or(GearError::ParameterStore(id))
    }

    fn put(&mut self, id: ParamId, value: u8) -> Result<(), GearError> {
        let mut ctxt = self
            .ctxt
            .lock()
            .map_err(|_| GearError::ParameterStore(id))?;
        if ctxt.failing.contains(&id) {
            return Err(GearError::ParameterStore(id));
        }
        ctxt.values.insert(id, value);
        ctxt.writes += 1;
        Ok(())
    }

    fn default_value(&self, id: ParamId) -> u8 {
        factory_default(id, &self.identity)
    }

    fn reset_user_defaults(&mut self) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            for id in ParamId::all() {
                // The short address survives a reset
                if id != ParamId::ShortAddress {
                    ctxt.values.insert(id, factory_default(id, &self.identity));
                }
            }
        }
    }
}
