//! # Channel and Key Naming
//!
//! Channels are colon-delimited hierarchical topics with templated segments,
//! e.g. `cache:invalidate:{key}`. Subscribers use either literal channels or
//! glob patterns (`*`, `?`, `[...]`), matching Redis `PSUBSCRIBE` semantics.
//!
//! ## Shared-Store Key Space
//!
//! | Key | Value | Lifetime |
//! |-----|-------|----------|
//! | `lock:{resource_id}` | lock token | TTL |
//! | `processed_msg:{message_id}` | sentinel | TTL |
//! | `global_sequence` | counter | permanent |
//! | `partition_sequence:{partition_key}` | counter | permanent |
//! | `dead_letter_queue` | list of serialized messages | permanent |

use crate::errors::ChannelError;

/// Prefix of lock keys.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Prefix of duplicate-detection keys.
pub const PROCESSED_KEY_PREFIX: &str = "processed_msg:";

/// Prefix of shared partition counters.
pub const PARTITION_SEQUENCE_PREFIX: &str = "partition_sequence:";

/// The single shared global sequence counter.
pub const GLOBAL_SEQUENCE_KEY: &str = "global_sequence";

/// Append-only dead-letter list.
pub const DEAD_LETTER_QUEUE_KEY: &str = "dead_letter_queue";

/// Sentinel stored under processed-message keys.
pub const PROCESSED_SENTINEL: &str = "1";

/// `lock:{resource_id}`
#[must_use]
pub fn lock_key(resource_id: &str) -> String {
    format!("{LOCK_KEY_PREFIX}{resource_id}")
}

/// `processed_msg:{message_id}`
#[must_use]
pub fn processed_key(message_id: &str) -> String {
    format!("{PROCESSED_KEY_PREFIX}{message_id}")
}

/// `partition_sequence:{partition_key}`
#[must_use]
pub fn partition_sequence_key(partition_key: &str) -> String {
    format!("{PARTITION_SEQUENCE_PREFIX}{partition_key}")
}

/// Whether a channel string contains glob metacharacters.
#[must_use]
pub fn is_pattern(channel: &str) -> bool {
    channel.contains(['*', '?', '['])
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// A channel name with `{segment}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelTemplate(&'static str);

impl ChannelTemplate {
    /// Cache invalidation broadcast for one cache key.
    pub const CACHE_INVALIDATE: ChannelTemplate = ChannelTemplate("cache:invalidate:{key}");

    /// Market data update for one symbol.
    pub const MARKET_UPDATE: ChannelTemplate = ChannelTemplate("market:update:{symbol}");

    /// Declare a template.
    #[must_use]
    pub const fn new(template: &'static str) -> Self {
        Self(template)
    }

    /// The raw template text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Fill every `{segment}` from `values`.
    ///
    /// Values may contain `:`, so hierarchical keys such as `prices:AAPL`
    /// render as extra segments that the template's wildcard still matches.
    ///
    /// # Errors
    ///
    /// - `ChannelError::MissingSegment` - a placeholder has no value
    /// - `ChannelError::GlobInValue` - a value would turn the channel into a pattern
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, ChannelError> {
        let mut rendered = Vec::new();
        for segment in self.0.split(':') {
            match placeholder(segment) {
                Some(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| ChannelError::MissingSegment {
                            template: self.0.to_string(),
                            segment: name.to_string(),
                        })?;
                    if is_pattern(value) {
                        return Err(ChannelError::GlobInValue {
                            segment: name.to_string(),
                            value: value.to_string(),
                        });
                    }
                    rendered.push(value.to_string());
                }
                None => rendered.push(segment.to_string()),
            }
        }
        Ok(rendered.join(":"))
    }

    /// A pattern matching every rendering of this template.
    #[must_use]
    pub fn wildcard(&self) -> String {
        self.0
            .split(':')
            .map(|segment| if placeholder(segment).is_some() { "*" } else { segment })
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

// =============================================================================
// PATTERNS
// =============================================================================

/// A compiled channel glob.
#[derive(Debug, Clone)]
pub struct ChannelPattern {
    raw: String,
    compiled: glob::Pattern,
}

impl ChannelPattern {
    /// Compile a glob.
    pub fn new(pattern: &str) -> Result<Self, ChannelError> {
        let compiled =
            glob::Pattern::new(pattern).map_err(|e| ChannelError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            raw: pattern.to_string(),
            compiled,
        })
    }

    /// Whether `channel` matches.
    #[must_use]
    pub fn matches(&self, channel: &str) -> bool {
        self.compiled.matches(channel)
    }

    /// The source glob.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ChannelPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ChannelPattern {}
