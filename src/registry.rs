use std::collections::HashMap;

use crate::error::RelayError;
use crate::provider::DynAdapter;
use crate::types::AdapterRequest;

/// Key used when a request does not name a provider.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Maps provider keys (`openai`, `anthropic`, `mistral`, `google`, ...) onto
/// adapter instances. Lookups are case-insensitive.
pub struct AdapterRegistry {
    adapters: HashMap<String, DynAdapter>,
}

impl AdapterRegistry {
    /// 创建 Builder 便于后续注册 Adapter
    pub fn builder() -> AdapterRegistryBuilder {
        AdapterRegistryBuilder {
            adapters: HashMap::new(),
        }
    }

    /// Looks up an adapter; `None` when the key is unknown.
    pub fn get(&self, key: &str) -> Option<DynAdapter> {
        self.adapters.get(&normalize_key(key)).cloned()
    }

    /// Resolves an optional key, defaulting to [`DEFAULT_PROVIDER`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Validation`] for keys with no registered adapter.
    pub fn resolve(&self, key: Option<&str>) -> Result<DynAdapter, RelayError> {
        let key = selected_key(key);
        self.get(&key).ok_or_else(|| RelayError::Validation {
            message: format!("unsupported provider: {key}"),
        })
    }

    /// Buffered completion through the selected adapter.
    pub async fn complete(
        &self,
        key: Option<&str>,
        request: AdapterRequest,
    ) -> Result<String, RelayError> {
        let adapter = self.resolve(key)?;
        adapter.complete(request).await
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.adapters.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// 负责注册 Adapter 的 Builder
pub struct AdapterRegistryBuilder {
    adapters: HashMap<String, DynAdapter>,
}

impl AdapterRegistryBuilder {
    /// Registers `adapter` under `key`; a later registration replaces an earlier one.
    pub fn register<S: AsRef<str>>(mut self, key: S, adapter: DynAdapter) -> Self {
        self.adapters.insert(normalize_key(key.as_ref()), adapter);
        self
    }

    pub fn build(self) -> AdapterRegistry {
        AdapterRegistry {
            adapters: self.adapters,
        }
    }
}

/// Trimmed, lower-cased key; blank or absent keys select the default provider.
pub fn selected_key(key: Option<&str>) -> String {
    match key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => normalize_key(key),
        None => DEFAULT_PROVIDER.to_string(),
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase()
}
