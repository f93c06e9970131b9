//! 0x10 DiagnosticSessionControl.

use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};
use crate::uds::server::SessionType;

/// Registers the session-control handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::SessionControl,
        priority: priority::NORMAL,
        name: "session_control",
        handler: Box::new(|server, payload| {
            let EventPayload::SessionControl { sub_function } = payload else {
                return HandlerOutcome::NotMine;
            };
            let session = match sub_function {
                0x01 => SessionType::Default,
                0x02 => SessionType::Programming,
                0x03 => SessionType::Extended,
                _ => return HandlerOutcome::Nrc(Nrc::SubFunctionNotSupportedInActiveSession),
            };
            let (p2, p2_star) = match session {
                SessionType::Default => (50u16, 2000u16),
                SessionType::Programming | SessionType::Extended => (5000u16, 5000u16),
            };
            server.session = session;
            server.p2_ms = p2 as u32;
            server.p2_star_ms = p2_star as u32;
            let mut body = vec![*sub_function];
            body.extend_from_slice(&p2.to_be_bytes());
            body.extend_from_slice(&p2_star.to_be_bytes());
            HandlerOutcome::Positive(body)
        }),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uds::server::dispatch::dispatch;
    use crate::uds::server::UdsServer;

    fn test_server() -> UdsServer {
        let (a, _b) = crate::isotp::LoopbackFrameIo::pair();
        let transport = crate::isotp::IsoTpTransport::new(
            Box::new(a) as Box<dyn crate::frame::FrameIo>,
            0x7E8,
            0x7E0,
            Some(0x7DF),
            Default::default(),
        );
        UdsServer::new(transport)
    }

    #[test]
    fn extended_session_relaxes_timing() {
        let mut server = test_server();
        let result = dispatch(
            &mut server,
            EventKind::SessionControl,
            EventPayload::SessionControl { sub_function: 0x03 },
        );
        assert_eq!(server.session, SessionType::Extended);
        match result {
            crate::uds::server::dispatch::DispatchResult::Positive(body) => {
                assert_eq!(body[0], 0x03);
            }
            _ => panic!("expected positive response"),
        }
    }
}
