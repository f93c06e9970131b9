//! 0x31 RoutineControl. This crate implements a single routine: StartRoutine on
//! `remote_console_rid` runs a shell command through the [`crate::shell_exec::ShellExecutor`]
//! collaborator and returns captured stdout/stderr as the routine's result bytes.

use crate::console::CaptureGuard;
use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload};
use crate::uds::server::dispatch::{priority, EventTable, HandlerOutcome, ServiceNode};

const START_ROUTINE: u8 = 0x01;

/// Registers the RoutineControl handler.
pub fn register(table: &mut EventTable) {
    table.register(ServiceNode {
        event: EventKind::RoutineControl,
        priority: priority::NORMAL,
        name: "routine_control",
        handler: Box::new(|server, payload| {
            let EventPayload::RoutineControl { sub_function, rid, options } = payload else {
                return HandlerOutcome::NotMine;
            };
            if *rid != server.remote_console_rid {
                return HandlerOutcome::NotMine;
            }
            if *sub_function != START_ROUTINE {
                return HandlerOutcome::Nrc(Nrc::SubFunctionNotSupported);
            }
            if server.session < server.remote_console_min_session {
                return HandlerOutcome::Nrc(Nrc::SecurityAccessDenied);
            }
            if server.security_level < server.remote_console_min_security {
                return HandlerOutcome::Nrc(Nrc::SecurityAccessDenied);
            }
            let command = match std::str::from_utf8(options) {
                Ok(s) => s,
                Err(_) => return HandlerOutcome::Nrc(Nrc::RequestOutOfRange),
            };

            let mut guard = CaptureGuard::install(&mut server.console_sink);
            let output = server.shell_executor.execute(command);
            guard.record(&output);
            let captured = guard.captured().to_vec();
            let overflowed = guard.overflowed();
            drop(guard);

            let mut body = vec![*sub_function];
            body.extend_from_slice(&rid.to_be_bytes());
            if overflowed {
                log::warn!("remote console output truncated");
            }
            body.extend_from_slice(&captured);
            HandlerOutcome::Positive(body)
        }),
    });
}
