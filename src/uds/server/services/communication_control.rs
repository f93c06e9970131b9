//! 0x28 CommunicationControl. Sub-functions 0x00-0x03 apply globally; 0x04/0x05 apply only
//! when the request's node id matches this server's configured `node_id`.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};
use crate::uds::server::CommState;

const ENABLE_RX_TX: u8 = 0x00;
const ENABLE_RX_DISABLE_TX: u8 = 0x01;
const DISABLE_RX_ENABLE_TX: u8 = 0x02;
const DISABLE_RX_TX: u8 = 0x03;
const ENABLE_RX_DISABLE_TX_NODE: u8 = 0x04;
const DISABLE_RX_ENABLE_TX_NODE: u8 = 0x05;

const COMM_TYPE_NORMAL: u8 = 0x01;
const COMM_TYPE_NM: u8 = 0x02;
const COMM_TYPE_BOTH: u8 = 0x03;

/// Registers the CommunicationControl handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::CommunicationControl,
        priority: priority::NORMAL,
        name: "communication_control",
        handler: Box::new(|server, payload| {
            let EventPayload::CommunicationControl { control_type, comm_type, node_id } = payload
            else {
                return HandlerOutcome::NotMine;
            };

            let state = match *control_type {
                ENABLE_RX_TX => CommState::EnableRxTx,
                ENABLE_RX_DISABLE_TX | ENABLE_RX_DISABLE_TX_NODE => CommState::EnableRxDisableTx,
                DISABLE_RX_ENABLE_TX | DISABLE_RX_ENABLE_TX_NODE => CommState::DisableRxEnableTx,
                DISABLE_RX_TX => CommState::DisableRxTx,
                _ => return HandlerOutcome::Nrc(Nrc::RequestOutOfRange),
            };

            let node_scoped = matches!(*control_type, ENABLE_RX_DISABLE_TX_NODE | DISABLE_RX_ENABLE_TX_NODE);
            if node_scoped {
                match node_id {
                    Some(id) if *id == server.node_id => {}
                    // A node-scoped request for a different node is silently ignored: no
                    // state change, but still a positive acknowledgement (spec §4.4).
                    _ => return HandlerOutcome::Positive(vec![*control_type]),
                }
            }

            match *comm_type {
                COMM_TYPE_NORMAL => server.comm_normal = state,
                COMM_TYPE_NM => server.comm_nm = state,
                COMM_TYPE_BOTH => {
                    server.comm_normal = state;
                    server.comm_nm = state;
                }
                _ => return HandlerOutcome::Nrc(Nrc::RequestOutOfRange),
            }

            HandlerOutcome::Positive(vec![*control_type])
        }),
    });
}
