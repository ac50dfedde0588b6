#![expect(
    clippy::module_name_repetitions,
    reason = "SubscriptionRegistry is re-exported from `ws` and read without the module path"
)]

use dashmap::DashSet;

use super::types::request::{Op, SubscriptionRequest};

/// Desired set of topics, kept across reconnects.
///
/// Holds the union of every subscribed topic minus every unsubscribed one. The lifecycle manager
/// replays the whole set after each successful (re)connection, so the server side is always
/// resynchronized against it. Mutating the registry never performs I/O by itself.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: DashSet<String>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the set operation described by `request`.
    pub fn apply(&self, request: &SubscriptionRequest) {
        match request.op {
            Op::Subscribe => {
                for topic in &request.topics {
                    self.topics.insert(topic.clone());
                }
            }
            Op::Unsubscribe => {
                for topic in &request.topics {
                    self.topics.remove(topic);
                }
            }
        }
    }

    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Current topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.iter().map(|t| t.key().clone()).collect();
        topics.sort_unstable();
        topics
    }

    /// The single combined `subscribe` request that rebuilds server-side state, if there is
    /// anything to rebuild.
    pub(crate) fn replay_request(&self) -> Option<SubscriptionRequest> {
        let topics = self.topics();
        (!topics.is_empty()).then(|| SubscriptionRequest::subscribe(topics))
    }
}
