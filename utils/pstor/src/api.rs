use crate::{watch::StoreWatch, Error};
use async_trait::async_trait;
use std::borrow::Cow;
use strum_macros::{AsRefStr, Display};

/// Trait defining the operations that can be performed on a key-value store.
#[async_trait]
pub trait Store: StoreKv + Sync + Send + Clone {
    /// Checks whether the store is reachable and serving requests.
    async fn online(&mut self) -> bool;
}

/// Trait defining the operations that can be performed on a key-value store.
/// Keys and values are opaque byte strings.
#[async_trait]
pub trait StoreKv: Sync + Send + Clone {
    /// Puts the given `V` value into the store under the given `K` key.
    async fn put_kv<K: StoreKey, V: StoreValue>(&mut self, key: K, value: V) -> Result<(), Error>;
    /// Gets all entries matched by the given selector, sorted by key.
    async fn get_kv(&mut self, selector: &KeySelector) -> Result<RangeResult, Error>;
    /// Deletes all entries matched by the given selector.
    /// Returns the number of deleted entries.
    async fn delete_kv(&mut self, selector: &KeySelector) -> Result<u64, Error>;
    /// Watches for changes on the entries matched by the given selector.
    /// Returns a stream which is signalled when an event occurs.
    /// # Warning: Events may be lost if we are restarted.
    async fn watch_kv(&mut self, selector: &KeySelector) -> Result<StoreWatch, Error>;
}

/// Store keys type trait.
pub trait StoreKey: Into<Vec<u8>> + Send {}
impl<T> StoreKey for T where T: Into<Vec<u8>> + Send {}
/// Store value type trait.
pub trait StoreValue: Into<Vec<u8>> + Send {}
impl<T> StoreValue for T where T: Into<Vec<u8>> + Send {}

/// Selects which entries an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelector {
    /// A single key.
    Key(Vec<u8>),
    /// Every key starting with the given prefix.
    Prefix(Vec<u8>),
    /// The whole key space.
    AllKeys,
}
impl KeySelector {
    /// Select a single key.
    pub fn key(key: impl Into<Vec<u8>>) -> Self {
        Self::Key(key.into())
    }
    /// Select all keys under the given prefix.
    /// An empty prefix selects the whole key space, as etcd does.
    pub fn prefix(prefix: impl Into<Vec<u8>>) -> Self {
        let prefix = prefix.into();
        if prefix.is_empty() {
            Self::AllKeys
        } else {
            Self::Prefix(prefix)
        }
    }
    /// The key the request is issued with.
    pub fn key_bytes(&self) -> &[u8] {
        match self {
            Self::Key(key) | Self::Prefix(key) => key,
            Self::AllKeys => &[],
        }
    }
    /// Check if the given key is covered by this selector.
    pub fn matches(&self, key: &[u8]) -> bool {
        match self {
            Self::Key(selected) => selected == key,
            Self::Prefix(prefix) => key.starts_with(prefix),
            Self::AllKeys => true,
        }
    }
}
impl std::fmt::Display for KeySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{}", String::from_utf8_lossy(key)),
            Self::Prefix(prefix) => write!(f, "{}*", String::from_utf8_lossy(prefix)),
            Self::AllKeys => write!(f, "<all keys>"),
        }
    }
}

/// A key-value entry along with its revision metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Revision of the store when the key was created.
    pub create_revision: i64,
    /// Revision of the last modification.
    pub mod_revision: i64,
    /// Number of modifications since creation, reset on delete.
    pub version: i64,
}
impl KeyValue {
    /// The key as utf8, with invalid sequences replaced.
    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
    /// The value as utf8, with invalid sequences replaced.
    pub fn value_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}
impl From<&etcd_client::KeyValue> for KeyValue {
    fn from(kv: &etcd_client::KeyValue) -> Self {
        Self {
            key: kv.key().to_vec(),
            value: kv.value().to_vec(),
            create_revision: kv.create_revision(),
            mod_revision: kv.mod_revision(),
            version: kv.version(),
        }
    }
}

/// Result of a range get.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeResult {
    /// Store revision when the range was served.
    pub revision: i64,
    /// The matched entries, sorted by key.
    pub kvs: Vec<KeyValue>,
    /// Total number of matched entries.
    pub count: u64,
}
impl RangeResult {
    /// The first matched entry, if any.
    pub fn first(&self) -> Option<&KeyValue> {
        self.kvs.first()
    }
}

/// Kind of change reported by a watch.
#[derive(Display, AsRefStr, Copy, Clone, Debug, PartialEq, Eq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum EventType {
    Put,
    Delete,
}

/// Representation of a watch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Put operation containing the new key-value.
    Put(KeyValue),
    /// Delete operation, the value is empty and `mod_revision` is the deletion revision.
    Delete(KeyValue),
}
impl WatchEvent {
    /// The kind of this event.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Put(_) => EventType::Put,
            Self::Delete(_) => EventType::Delete,
        }
    }
    /// The affected entry.
    pub fn kv(&self) -> &KeyValue {
        match self {
            Self::Put(kv) | Self::Delete(kv) => kv,
        }
    }
}
impl std::fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Put(kv) => write!(f, "{} {}={}", self.event_type(), kv.key_str(), kv.value_str()),
            Self::Delete(kv) => write!(f, "{} {}", self.event_type(), kv.key_str()),
        }
    }
}

/// A batch of events delivered by a watch, all at the same store revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchUpdate {
    pub revision: i64,
    pub events: Vec<WatchEvent>,
}
impl std::fmt::Display for WatchUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WatchUpdate[rev={}, events=[", self.revision)?;
        for (index, event) in self.events.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{event}")?;
        }
        write!(f, "]]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_matching() {
        let key = KeySelector::key("hello");
        assert!(key.matches(b"hello"));
        assert!(!key.matches(b"hello2"));

        let prefix = KeySelector::prefix("/hello/");
        assert!(prefix.matches(b"/hello/1"));
        assert!(prefix.matches(b"/hello/"));
        assert!(!prefix.matches(b"hello"));
        assert!(!prefix.matches(b"/hello"));

        assert!(KeySelector::AllKeys.matches(b""));
        assert!(KeySelector::AllKeys.matches(b"anything"));
        assert_eq!(KeySelector::prefix(""), KeySelector::AllKeys);
    }

    #[test]
    fn update_display() {
        let update = WatchUpdate {
            revision: 7,
            events: vec![
                WatchEvent::Put(KeyValue {
                    key: b"hello".to_vec(),
                    value: b"test".to_vec(),
                    ..Default::default()
                }),
                WatchEvent::Delete(KeyValue {
                    key: b"/hello/1".to_vec(),
                    ..Default::default()
                }),
            ],
        };
        assert_eq!(
            update.to_string(),
            "WatchUpdate[rev=7, events=[PUT hello=test, DELETE /hello/1]]"
        );
        assert_eq!(KeySelector::prefix("/hello/").to_string(), "/hello/*");
        assert_eq!(update.events[0].event_type().as_ref(), "PUT");
        assert_eq!(update.events[1].event_type().to_string(), "DELETE");
    }
}
