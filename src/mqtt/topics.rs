//! Remembered MQTT subscriptions.
//!
//! Topics requested by the backend are kept here, deduplicated, and
//! persisted as one postcard blob so that they are re-subscribed after a
//! broker reconnect or a restart. This is the only place topic durability
//! is guaranteed, so a topic that would not fit in the blob is refused
//! rather than held in memory only.

use core::fmt;

use heapless::Vec as HVec;
use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

pub const TOPICS_NAMESPACE: &str = "mqttTopics";
pub const TOPICS_KEY: &str = "topics";

pub const MAX_TOPICS: usize = 32;

/// Largest persisted blob, written or read back.
pub const MAX_BLOB_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicRejected {
    RegistryFull,
    TooLargeToPersist,
}

impl fmt::Display for TopicRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistryFull => write!(f, "registry full ({MAX_TOPICS} topics)"),
            Self::TooLargeToPersist => {
                write!(f, "topic list would exceed {MAX_BLOB_LEN} bytes")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicRegistry {
    topics: HVec<String, MAX_TOPICS>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore persisted topics. A missing or corrupt blob yields an empty
    /// registry.
    pub fn load<S: StoragePort + ?Sized>(store: &S) -> Self {
        let mut buf = vec![0u8; MAX_BLOB_LEN];
        let len = match store.read(TOPICS_NAMESPACE, TOPICS_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => return Self::new(),
            Err(e) => {
                warn!("MQTT: could not read stored topics: {}", e);
                return Self::new();
            }
        };
        match postcard::from_bytes::<Vec<String>>(&buf[..len]) {
            Ok(mut stored) => {
                stored.dedup();
                let mut topics = HVec::new();
                for topic in stored {
                    if topics.push(topic).is_err() {
                        warn!("MQTT: stored topic list longer than {}, truncated", MAX_TOPICS);
                        break;
                    }
                }
                info!("MQTT: restored {} topic(s)", topics.len());
                Self { topics }
            }
            Err(e) => {
                warn!("MQTT: stored topic list unreadable ({}), starting empty", e);
                Self::new()
            }
        }
    }

    /// Remember `topic`. `Ok(false)` if it was empty or already known.
    pub fn add(&mut self, topic: &str) -> Result<bool, TopicRejected> {
        if topic.is_empty() || self.contains(topic) {
            return Ok(false);
        }
        self.topics
            .push(topic.to_owned())
            .map_err(|_| TopicRejected::RegistryFull)?;
        if self.encode().is_none() {
            self.topics.pop();
            return Err(TopicRejected::TooLargeToPersist);
        }
        Ok(true)
    }

    /// The persisted form, or `None` if it would not fit in storage.
    fn encode(&self) -> Option<Vec<u8>> {
        let blob = postcard::to_allocvec(&self.topics).ok()?;
        (blob.len() <= MAX_BLOB_LEN).then_some(blob)
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn save<S: StoragePort + ?Sized>(&self, store: &mut S) -> Result<(), StorageError> {
        let blob = self.encode().ok_or(StorageError::Full)?;
        store.write(TOPICS_NAMESPACE, TOPICS_KEY, &blob)
    }

    /// Forget every topic in memory only (storage already erased).
    pub fn forget(&mut self) {
        self.topics.clear();
    }
}
