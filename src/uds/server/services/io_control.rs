//! 0x2F IOControlByIdentifier.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};
use crate::uds::server::IoAction;

/// Registers the IOControlByIdentifier handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::IoControl,
        priority: priority::NORMAL,
        name: "io_control",
        handler: Box::new(|server, payload| {
            let EventPayload::IoControl { did, action: action_byte, data } = payload else {
                return HandlerOutcome::NotMine;
            };
            let Some(node) = server.io_nodes.iter_mut().find(|n| n.did == *did) else {
                return HandlerOutcome::Nrc(Nrc::RequestOutOfRange);
            };
            let Some(action) = IoAction::from_byte(*action_byte) else {
                return HandlerOutcome::Nrc(Nrc::RequestOutOfRange);
            };
            node.is_overridden = !matches!(action, IoAction::ReturnControlToEcu | IoAction::ResetToDefault);
            let state = (node.handler)(action, data);
            let mut body = did.to_be_bytes().to_vec();
            body.push(*action_byte);
            body.extend_from_slice(&state);
            HandlerOutcome::Positive(body)
        }),
    });
}
