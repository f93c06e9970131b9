//! Client transaction helper (§4.5): `transaction()` is the single funnel every command in the
//! shell (§4.8) goes through. `prepare` → invoke the caller's send closure → `wait_transaction`.

use super::UdsClient;
use crate::error::DiagServerResult;

/// Default transaction timeout, used by callers that don't need a longer one (e.g. flashing).
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Runs one request/response transaction. `send_call` encodes and transmits the request;
/// its `DiagServerResult<()>` short-circuits the transaction on a synchronous send error.
pub fn transaction<F>(client: &mut UdsClient, label: &str, timeout_ms: u32, send_call: F) -> DiagServerResult<Vec<u8>>
where
    F: FnOnce(&mut UdsClient) -> DiagServerResult<()>,
{
    log::debug!("transaction '{label}' starting (timeout {timeout_ms}ms)");
    client.prepare();
    send_call(client)?;
    client.wait_transaction(timeout_ms)
}
