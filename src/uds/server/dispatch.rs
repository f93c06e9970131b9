//! Priority-ordered chain-of-responsibility dispatch, bound to [`EventKind`].
//!
//! One [`EventTable`] per server; each bucket is a `Vec<ServiceNode>` kept sorted by
//! `priority` (stable, so ties keep insertion order). [`dispatch`] walks the chain for the
//! fired event and triages each handler's [`HandlerOutcome`] per the spec's algorithm.

use super::UdsServer;
use crate::nrc::Nrc;
use crate::uds::event::{EventKind, EventPayload, EVENT_KIND_COUNT};

/// Suggested priority buckets; lower runs earlier. Ties keep insertion order.
pub mod priority {
    /// Runs before everything else (e.g. a logging/metrics observer).
    pub const HIGHEST: u8 = 0;
    /// Runs early.
    pub const HIGH: u8 = 64;
    /// Default priority for ordinary service handlers.
    pub const NORMAL: u8 = 128;
    /// Runs late.
    pub const LOW: u8 = 192;
    /// Runs dead last.
    pub const LOWEST: u8 = 255;
}

/// What a service node decided about the event it was just handed.
pub enum HandlerOutcome {
    /// The handler fully serviced the request; its `body` becomes the positive response.
    Positive(Vec<u8>),
    /// The handler needs more time; reply `0x78` now and keep the transaction open.
    ResponsePending,
    /// An observer: record that someone handled this, but let later handlers also run.
    Continue,
    /// "Not my request" — try the next handler in the chain.
    NotMine,
    /// The handler recognised the request and is rejecting it outright.
    Nrc(Nrc),
}

/// One registered handler entry in a server's dispatch table.
pub struct ServiceNode {
    /// The event kind this node is bound to (redundant with its bucket, kept for debugging).
    pub event: EventKind,
    /// Sort key within the bucket; lower runs earlier.
    pub priority: u8,
    /// Debug name, logged on dispatch.
    pub name: &'static str,
    /// The handler itself. Boxed so it can capture owned state (file/console/security engines).
    pub handler: Box<dyn FnMut(&mut UdsServer, &EventPayload) -> HandlerOutcome + Send>,
}

impl std::fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceNode")
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .finish()
    }
}

/// A flat, event-kind-indexed map of handler chains. A `Vec` rather than a hash map since
/// [`EventKind`] is a small closed enum — indexing by discriminant is both simpler and faster.
#[derive(Default)]
pub struct EventTable {
    buckets: Vec<Vec<ServiceNode>>,
}

impl std::fmt::Debug for EventTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTable")
            .field("bucket_sizes", &self.buckets.iter().map(|b| b.len()).collect::<Vec<_>>())
            .finish()
    }
}

impl EventTable {
    /// Builds an empty table with one bucket per [`EventKind`] variant.
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(EVENT_KIND_COUNT);
        buckets.resize_with(EVENT_KIND_COUNT, Vec::new);
        Self { buckets }
    }

    /// Registers `node`, inserting it into its event's bucket and re-sorting by priority
    /// (stable, so nodes of equal priority keep their relative registration order).
    pub fn register(&mut self, node: ServiceNode) {
        let bucket = &mut self.buckets[node.event as usize];
        bucket.push(node);
        bucket.sort_by_key(|n| n.priority);
    }

    fn chain_mut(&mut self, event: EventKind) -> &mut Vec<ServiceNode> {
        &mut self.buckets[event as usize]
    }
}

/// Result of dispatching one event through its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Positive response body to send back.
    Positive(Vec<u8>),
    /// Send `0x78` and keep the transaction open; a later event will supply the real response.
    ResponsePending,
    /// Negative response to send back.
    Nrc(Nrc),
}

/// Walks the handler chain for `event`, classifying each [`HandlerOutcome`] per the spec's
/// algorithm (§4.3): stop on Positive/ResponsePending/any rejecting NRC; keep going on
/// Continue/NotMine; an empty chain, or a chain exhausted with no Positive/Continue, yields
/// `ServiceNotSupported`; a chain exhausted after at least one Continue yields Positive(empty).
pub fn dispatch(server: &mut UdsServer, event: EventKind, payload: EventPayload) -> DispatchResult {
    // The chain is temporarily taken out of the table so handler closures can mutably borrow
    // `server` (which owns the table) without aliasing it.
    let mut chain = std::mem::take(server.dispatch_table.chain_mut(event));
    let mut any_continued = false;
    let mut result = DispatchResult::Nrc(Nrc::ServiceNotSupported);

    for node in chain.iter_mut() {
        log::debug!("dispatch: {:?} -> node '{}' (priority {})", event, node.name, node.priority);
        match (node.handler)(server, &payload) {
            HandlerOutcome::Positive(body) => {
                result = DispatchResult::Positive(body);
                break;
            }
            HandlerOutcome::ResponsePending => {
                result = DispatchResult::ResponsePending;
                break;
            }
            HandlerOutcome::Continue => {
                any_continued = true;
            }
            HandlerOutcome::NotMine => {}
            HandlerOutcome::Nrc(nrc) => {
                result = DispatchResult::Nrc(nrc);
                break;
            }
        }
    }

    if matches!(&result, DispatchResult::Nrc(Nrc::ServiceNotSupported)) && any_continued {
        result = DispatchResult::Positive(Vec::new());
    }

    *server.dispatch_table.chain_mut(event) = chain;
    result
}
