//! 0x27 SecurityAccess: request-seed (odd sub-function) / validate-key (even sub-function).

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};

/// Registers the request-seed and validate-key handlers.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::SecurityRequestSeed,
        priority: priority::NORMAL,
        name: "security_request_seed",
        handler: Box::new(|server, payload| {
            let EventPayload::SecurityRequestSeed { level } = payload else {
                return HandlerOutcome::NotMine;
            };
            let Some(instance) = server
                .security_instances
                .iter_mut()
                .find(|i| i.supported_level == *level)
            else {
                return HandlerOutcome::NotMine;
            };
            if server.security_level == *level {
                instance.current_seed = 0;
                let mut body = vec![*level];
                body.extend_from_slice(&[0u8; 4]);
                return HandlerOutcome::Positive(body);
            }
            let seed: u32 = rand::random();
            let seed = seed.max(1); // 0 is reserved for "already unlocked"
            instance.current_seed = seed;
            let mut body = vec![*level];
            body.extend_from_slice(&seed.to_be_bytes());
            HandlerOutcome::Positive(body)
        }),
    });

    table.register(ServiceNode {
        event: EventKind::SecurityValidateKey,
        priority: priority::NORMAL,
        name: "security_validate_key",
        handler: Box::new(|server, payload| {
            let EventPayload::SecurityValidateKey { level, key } = payload else {
                return HandlerOutcome::NotMine;
            };
            let Some(instance) = server
                .security_instances
                .iter_mut()
                .find(|i| i.supported_level == *level)
            else {
                return HandlerOutcome::NotMine;
            };
            let seed = instance.current_seed;
            instance.current_seed = 0;
            if seed == 0 {
                return HandlerOutcome::Nrc(Nrc::RequestSequenceError);
            }
            let expected = instance.algorithm.compute_key(seed, &instance.secret_key);
            if key.len() != expected.len() || key != &expected {
                return HandlerOutcome::Nrc(Nrc::InvalidKey);
            }
            server.security_level = *level;
            HandlerOutcome::Positive(vec![*level + 1])
        }),
    });
}
