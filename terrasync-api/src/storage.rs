use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

/// Key/value record store surviving power loss (NVS on real hardware).
///
/// No transactional guarantees: a partial write is non-fatal and durable
/// truth is whatever the latest complete write left behind.
#[allow(async_fn_in_trait)]
pub trait LocalStorage {
    type Error: core::fmt::Debug;

    async fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error>;

    async fn set_item(&mut self, key: &str, value: &str) -> Result<(), Self::Error>;

    async fn remove_item(&mut self, key: &str) -> Result<(), Self::Error>;

    /// Drop every record (factory reset).
    async fn clear(&mut self) -> Result<(), Self::Error>;
}

/// In-memory store for tests and host-side tooling.
pub struct MemoryStorage {
    data: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage for MemoryStorage {
    type Error = core::convert::Infallible;

    async fn get_item(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.data.get(key).cloned())
    }

    async fn set_item(&mut self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&mut self, key: &str) -> Result<(), Self::Error> {
        self.data.remove(key);
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), Self::Error> {
        self.data.clear();
        Ok(())
    }
}
