//! The unit of data routed by exchanges and held by queues.

use std::collections::HashMap;

use bytes::Bytes;

/// A message in flight through the broker.
///
/// `id` is assigned only when a message transitions out of `HOLDING` in the
/// delivery loop (see `delivery.rs`) — a message sitting in a queue's buffer
/// has no id yet. `delivery_count` increments exactly once per dispatch
/// attempt, whether or not the attempt succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: Option<String>,
    headers: HashMap<String, String>,
    body: Bytes,
    delivery_count: u32,
}

impl Message {
    pub fn new(body: impl Into<Bytes>, headers: Option<HashMap<String, String>>) -> Self {
        Message {
            id: None,
            headers: headers.unwrap_or_default(),
            body: body.into(),
            delivery_count: 0,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    /// Assigns a fresh id for this dispatch attempt and bumps the delivery
    /// counter. Called exactly once per attempt, on the transition out of
    /// `HOLDING` (spec.md §4.5): a message keeps accumulating delivery
    /// attempts across redeliveries but is assigned a new id each time.
    pub(crate) fn begin_dispatch(&mut self, id: String) {
        self.id = Some(id);
        self.delivery_count += 1;
    }

    /// Clears the id so the message re-enters the queue as "unpublished"
    /// (spec.md §4.5: a nacked/dropped message is assigned a *new* id on its
    /// next delivery attempt, but keeps its delivery counter).
    pub(crate) fn reset_for_redelivery(&mut self) {
        self.id = None;
    }
}
