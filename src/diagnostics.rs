use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ErrorKind {
    MissingTransform,
    StaleTransform,
    InvalidPointCloud,
    UnsupportedPointCloud,
    InvalidMarker,
    InvalidTransform,
}

/// Per-topic error sink. One message is kept per (topic, kind); adding replaces it.
#[derive(Debug, Default)]
pub struct TopicErrors {
    topics: HashMap<String, BTreeMap<ErrorKind, String>>,
}

impl TopicErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_to_topic(&mut self, topic: &str, kind: ErrorKind, message: impl Into<String>) {
        let message = message.into();
        let errors = self.topics.entry(topic.to_string()).or_default();
        if errors.get(&kind) != Some(&message) {
            log::warn!("{}: {:?}: {}", topic, kind, message);
            errors.insert(kind, message);
        }
    }

    /// Returns true if an error was removed.
    pub fn remove_from_topic(&mut self, topic: &str, kind: ErrorKind) -> bool {
        let Some(errors) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = errors.remove(&kind).is_some();
        if errors.is_empty() {
            self.topics.remove(topic);
        }
        if removed {
            log::debug!("{}: {:?} cleared", topic, kind);
        }
        removed
    }

    pub fn clear_topic(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }

    pub fn get(&self, topic: &str, kind: ErrorKind) -> Option<&str> {
        self.topics
            .get(topic)
            .and_then(|errors| errors.get(&kind))
            .map(String::as_str)
    }

    pub fn has(&self, topic: &str, kind: ErrorKind) -> bool {
        self.get(topic, kind).is_some()
    }

    pub fn errors_for_topic(&self, topic: &str) -> impl Iterator<Item = (ErrorKind, &str)> {
        self.topics
            .get(topic)
            .into_iter()
            .flat_map(|errors| errors.iter().map(|(kind, msg)| (*kind, msg.as_str())))
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
