//! # Handler Registry
//!
//! Maps subscribed channels to handlers. Keyed by the channel string, one
//! handler per key: re-registering a key replaces its handler, even if the
//! kind changes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared_types::ChannelPattern;

use crate::handler::MessageHandler;
use crate::transport::TransportMessage;

/// How a subscription key is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Literal channel name.
    Exact,
    /// Glob pattern (`*`, `?`, `[...]`).
    Pattern,
}

/// Channel → handler table.
#[derive(Default)]
pub struct HandlerRegistry {
    exact: HashMap<String, Arc<dyn MessageHandler>>,
    patterns: HashMap<String, (ChannelPattern, Arc<dyn MessageHandler>)>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a literal channel. Returns the kind previously registered
    /// under the same key, if any.
    pub fn insert_exact(
        &mut self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<ChannelKind> {
        let previous = self.remove(channel);
        self.exact.insert(channel.to_string(), handler);
        previous
    }

    /// Register a compiled pattern. Returns the kind previously registered
    /// under the same key, if any.
    pub fn insert_pattern(
        &mut self,
        pattern: ChannelPattern,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<ChannelKind> {
        let key = pattern.as_str().to_string();
        let previous = self.remove(&key);
        self.patterns.insert(key, (pattern, handler));
        previous
    }

    /// Drop a registration, returning its kind.
    pub fn remove(&mut self, channel: &str) -> Option<ChannelKind> {
        if self.exact.remove(channel).is_some() {
            return Some(ChannelKind::Exact);
        }
        self.patterns
            .remove(channel)
            .map(|_| ChannelKind::Pattern)
    }

    /// Find the handler for a delivery.
    ///
    /// Exact deliveries resolve by channel. Pattern deliveries resolve by
    /// the reported pattern. When the transport does not report which
    /// pattern fired, the longest matching pattern wins, ties going to the
    /// lexicographically smallest key.
    #[must_use]
    pub fn resolve(&self, message: &TransportMessage) -> Option<Arc<dyn MessageHandler>> {
        match message.kind {
            ChannelKind::Exact => self.exact.get(&message.channel).cloned(),
            ChannelKind::Pattern => match &message.pattern {
                Some(pattern) => self.patterns.get(pattern).map(|(_, h)| h.clone()),
                None => self
                    .patterns
                    .iter()
                    .filter(|(_, (pattern, _))| pattern.matches(&message.channel))
                    .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
                    .map(|(_, (_, h))| h.clone()),
            },
        }
    }

    /// All registrations, sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, ChannelKind)> {
        let mut entries: Vec<_> = self
            .exact
            .keys()
            .map(|c| (c.clone(), ChannelKind::Exact))
            .chain(self.patterns.keys().map(|p| (p.clone(), ChannelKind::Pattern)))
            .collect();
        entries.sort();
        entries
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;

    fn noop() -> Arc<dyn MessageHandler> {
        FnHandler::new(|_| Ok(()))
    }

    fn delivery(channel: &str, kind: ChannelKind, pattern: Option<&str>) -> TransportMessage {
        TransportMessage {
            channel: channel.to_string(),
            kind,
            pattern: pattern.map(str::to_string),
            payload: String::new(),
        }
    }

    #[test]
    fn test_resubscribe_replaces() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(registry.insert_exact("a", noop()), None);
        assert_eq!(registry.insert_exact("a", noop()), Some(ChannelKind::Exact));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kind_change_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.insert_exact("jobs:*", noop());
        let previous = registry.insert_pattern(ChannelPattern::new("jobs:*").unwrap(), noop());
        assert_eq!(previous, Some(ChannelKind::Exact));
        assert_eq!(
            registry.entries(),
            vec![("jobs:*".to_string(), ChannelKind::Pattern)]
        );
    }

    #[test]
    fn test_resolve() {
        let mut registry = HandlerRegistry::new();
        registry.insert_exact("cache:invalidate:AAPL", noop());
        registry.insert_pattern(ChannelPattern::new("market:*").unwrap(), noop());

        assert!(registry
            .resolve(&delivery("cache:invalidate:AAPL", ChannelKind::Exact, None))
            .is_some());
        assert!(registry
            .resolve(&delivery("cache:invalidate:MSFT", ChannelKind::Exact, None))
            .is_none());
        assert!(registry
            .resolve(&delivery("market:update", ChannelKind::Pattern, Some("market:*")))
            .is_some());
        assert!(registry
            .resolve(&delivery("market:update", ChannelKind::Pattern, None))
            .is_some());
        assert!(registry
            .resolve(&delivery("market:update", ChannelKind::Exact, None))
            .is_none());
    }

    #[test]
    fn test_unreported_pattern_prefers_most_specific() {
        let broad = noop();
        let specific = noop();
        let mut registry = HandlerRegistry::new();
        registry.insert_pattern(ChannelPattern::new("market:*").unwrap(), broad.clone());
        registry.insert_pattern(ChannelPattern::new("market:update:*").unwrap(), specific.clone());

        for _ in 0..10 {
            let chosen = registry
                .resolve(&delivery("market:update:AAPL", ChannelKind::Pattern, None))
                .unwrap();
            assert!(Arc::ptr_eq(&chosen, &specific));
        }
        let chosen = registry
            .resolve(&delivery("market:close", ChannelKind::Pattern, None))
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &broad));
    }

    #[test]
    fn test_unreported_pattern_tie_is_stable() {
        let prefix = noop();
        let suffix = noop();
        let mut registry = HandlerRegistry::new();
        registry.insert_pattern(ChannelPattern::new("jobs:a*").unwrap(), prefix);
        registry.insert_pattern(ChannelPattern::new("jobs:*a").unwrap(), suffix.clone());

        let chosen = registry
            .resolve(&delivery("jobs:aa", ChannelKind::Pattern, None))
            .unwrap();
        assert!(Arc::ptr_eq(&chosen, &suffix));
    }

    #[test]
    fn test_entries_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.insert_exact("b", noop());
        registry.insert_pattern(ChannelPattern::new("a:*").unwrap(), noop());
        assert_eq!(
            registry.entries(),
            vec![
                ("a:*".to_string(), ChannelKind::Pattern),
                ("b".to_string(), ChannelKind::Exact),
            ]
        );
    }

    #[test]
    fn test_remove() {
        let mut registry = HandlerRegistry::new();
        registry.insert_pattern(ChannelPattern::new("a:*").unwrap(), noop());
        assert_eq!(registry.remove("a:*"), Some(ChannelKind::Pattern));
        assert_eq!(registry.remove("a:*"), None);
        assert!(registry.is_empty());
    }
}
