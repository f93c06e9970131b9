//! Append-only mapping from response SID to a single handler (§4.7).

use std::collections::HashMap;

/// Dispatches a full response payload to whichever handler last registered for its SID.
#[derive(Default)]
pub struct ResponseRegistry {
    handlers: HashMap<u8, Box<dyn FnMut(&[u8]) + Send>>,
}

impl ResponseRegistry {
    /// Builds an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `sid`, overwriting any existing entry.
    pub fn register(&mut self, sid: u8, handler: Box<dyn FnMut(&[u8]) + Send>) {
        self.handlers.insert(sid, handler);
    }

    /// Looks up the handler for `payload`'s leading SID byte and invokes it with the full
    /// payload. No-op if nothing is registered for that SID.
    pub fn dispatch(&mut self, payload: &[u8]) {
        let Some(&sid) = payload.first() else { return };
        if let Some(handler) = self.handlers.get_mut(&sid) {
            handler(payload);
        }
    }
}

impl std::fmt::Debug for ResponseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseRegistry")
            .field("registered_sids", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatches_to_registered_sid_and_overwrites() {
        let mut registry = ResponseRegistry::new();
        let seen = Arc::new(AtomicU8::new(0));
        let seen2 = seen.clone();
        registry.register(0x62, Box::new(move |body| seen2.store(body[1], Ordering::SeqCst)));
        registry.dispatch(&[0x62, 0xAB]);
        assert_eq!(seen.load(Ordering::SeqCst), 0xAB);

        let seen3 = seen.clone();
        registry.register(0x62, Box::new(move |body| seen3.store(body[1] + 1, Ordering::SeqCst)));
        registry.dispatch(&[0x62, 0xAB]);
        assert_eq!(seen.load(Ordering::SeqCst), 0xAC);
    }
}
