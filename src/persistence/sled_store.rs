use chrono::Utc;
use sled::{Db, Tree};
use tracing::{debug, warn};

use crate::codec::{Address, Message};
use crate::utils::error::Result;

/// Published messages per routing path.
///
/// Keys are the store time in milliseconds followed by a sled-generated id,
/// both big-endian, so iteration order is publication order. Values are the
/// encoded message.
#[derive(Clone)]
pub struct History {
    db: Db,
    ttl_seconds: Option<i64>,
    max_per_address: Option<usize>,
}

impl History {
    pub fn open(
        path: &str,
        ttl_seconds: Option<i64>,
        max_per_address: Option<usize>,
    ) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ttl_seconds,
            max_per_address,
        })
    }

    /// A history that is discarded when dropped.
    pub fn temporary(ttl_seconds: Option<i64>, max_per_address: Option<usize>) -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            ttl_seconds,
            max_per_address,
        })
    }

    pub fn store(&self, message: &Message) -> Result<()> {
        let tree = self.db.open_tree(message.address().path())?;
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&Utc::now().timestamp_millis().to_be_bytes());
        key[8..].copy_from_slice(&self.db.generate_id()?.to_be_bytes());
        tree.insert(key, message.encode().as_ref())?;

        if let Some(max) = self.max_per_address {
            let excess = tree.len().saturating_sub(max);
            for _ in 0..excess {
                tree.pop_min()?;
            }
        }
        Ok(())
    }

    /// Stored messages for exactly `path`, oldest first, after dropping
    /// expired ones.
    pub fn load(&self, path: &str) -> Result<Vec<Message>> {
        let tree = self.db.open_tree(path)?;
        self.cleanup_expired(&tree)?;

        let mut messages = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            match Message::decode(&value) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("skipping unreadable history entry in '{path}': {e}"),
            }
        }
        Ok(messages)
    }

    /// Stored messages a subscription on `pattern` would have received,
    /// grouped by path.
    pub fn replay(&self, pattern: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        for name in self.db.tree_names() {
            let Ok(path) = std::str::from_utf8(&name) else {
                continue;
            };
            // sled's own default tree
            if path == "__sled__default" {
                continue;
            }
            if Address::from_path(path).matches(pattern) {
                messages.extend(self.load(path)?);
            }
        }
        debug!("replaying {} stored messages for '{pattern}'", messages.len());
        Ok(messages)
    }

    fn cleanup_expired(&self, tree: &Tree) -> Result<()> {
        let Some(ttl) = self.ttl_seconds else {
            return Ok(());
        };
        let expiry = Utc::now()
            .timestamp_millis()
            .saturating_sub(ttl.saturating_mul(1000));

        let old_keys: Vec<_> = tree
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .filter(|key| {
                key.len() == 16
                    && <[u8; 8]>::try_from(&key[..8])
                        .map(i64::from_be_bytes)
                        .is_ok_and(|stored| stored < expiry)
            })
            .collect();

        for key in old_keys {
            tree.remove(key)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_per_address", &self.max_per_address)
            .finish()
    }
}
