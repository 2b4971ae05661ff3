//! Static per-network parameters and the table they live in.
use crate::error::WatchError;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

/// Immutable description of one network.
///
/// Whether a network is watched by polling or by push subscription is decided
/// solely by `subscription_endpoint`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainProfile {
    /// Network identifier (`xdai`, `ropsten`, ...). Filled from the table key when loading.
    #[serde(default)]
    pub id: String,
    /// Average time between blocks; drives every polling cadence.
    pub avg_block_time_ms: u64,
    /// JSON-RPC request/response endpoint.
    pub rpc_endpoint: String,
    /// Push endpoint for pending-transaction subscriptions, if the node offers one.
    #[serde(default)]
    pub subscription_endpoint: Option<String>,
    /// Confirmations required when a request does not name its own threshold.
    pub default_confirmation_threshold: u64,
}

impl ChainProfile {
    /// Average block time as a [`Duration`].
    pub fn avg_block_time(&self) -> Duration {
        Duration::from_millis(self.avg_block_time_ms)
    }

    /// True when detection should use the push subscriber.
    pub fn uses_subscription(&self) -> bool {
        self.subscription_endpoint
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn validate(&self) -> Result<(), WatchError> {
        let invalid = |reason: &str| WatchError::InvalidProfile {
            network: self.id.clone(),
            reason: reason.to_owned(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("empty network id"));
        }
        if self.avg_block_time_ms == 0 {
            return Err(invalid("avgBlockTimeMs must be positive"));
        }
        if self.rpc_endpoint.trim().is_empty() {
            return Err(invalid("rpcEndpoint is empty"));
        }
        Ok(())
    }
}

/// Profiles keyed by network id.
///
/// Supplied at startup; extending to a new network is a data entry.
#[derive(Clone, Debug, Default)]
pub struct ChainRegistry {
    profiles: BTreeMap<String, ChainProfile>,
}

impl ChainRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The networks shipped with the crate.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.profiles.insert(
            "xdai".into(),
            ChainProfile {
                id: "xdai".into(),
                avg_block_time_ms: 500,
                rpc_endpoint: "https://dai.poa.network".into(),
                subscription_endpoint: None,
                default_confirmation_threshold: 1,
            },
        );
        reg.profiles.insert(
            "ropsten".into(),
            ChainProfile {
                id: "ropsten".into(),
                avg_block_time_ms: 21_000,
                rpc_endpoint: "https://ropsten.infura.io".into(),
                subscription_endpoint: Some("wss://ropsten.infura.io/ws".into()),
                default_confirmation_threshold: 1,
            },
        );
        reg
    }

    /// Decode a JSON object of `{ "<network>": { ...profile } }`.
    pub fn from_json_str(s: &str) -> Result<Self, WatchError> {
        let raw: BTreeMap<String, ChainProfile> = serde_json::from_str(s)?;
        let mut reg = Self::new();
        for (id, mut profile) in raw {
            profile.id = id;
            reg.insert(profile)?;
        }
        Ok(reg)
    }

    /// Read and decode a JSON profile table from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Add or replace a profile after validating it.
    pub fn insert(&mut self, profile: ChainProfile) -> Result<(), WatchError> {
        profile.validate()?;
        self.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    /// Look up a profile; unknown ids are a configuration error.
    pub fn resolve(&self, network: &str) -> Result<&ChainProfile, WatchError> {
        self.profiles
            .get(network)
            .ok_or_else(|| WatchError::UnknownNetwork(network.to_owned()))
    }

    /// Registered network ids.
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
