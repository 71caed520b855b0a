//! # Node Configuration
//!
//! The operator binary hosts a whole in-process network: one notary and a
//! roster of parties. [`NodeConfig`] is read from a JSON file; anything the
//! file leaves out falls back to [`NodeConfig::default`].
//!
//! ```json
//! {
//!   "notary": "Notary",
//!   "parties": ["BankA", "BankB", "Alice", "Bob"],
//!   "data_dir": "/var/lib/mycash",
//!   "protocol": { "response_timeout_ms": 5000 }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use mycash_protocol::config::ProtocolConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name of the notary party.
    pub notary: String,
    /// Names of the cash-holding parties, banks and corporates alike.
    pub parties: Vec<String>,
    /// Where vaults, notary state and keys are kept. `None` runs everything
    /// in memory with fresh keys.
    pub data_dir: Option<PathBuf>,
    /// Knobs shared by every hosted node.
    pub protocol: ProtocolConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            notary: "Notary".to_string(),
            parties: ["BankA", "BankB", "Alice", "Bob"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            data_dir: None,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: NodeConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Names must be non-empty and unique, the notary included.
    pub fn validate(&self) -> Result<()> {
        if self.parties.is_empty() {
            bail!("the party roster is empty");
        }
        let mut seen = HashSet::new();
        for name in std::iter::once(&self.notary).chain(self.parties.iter()) {
            if name.trim().is_empty() {
                bail!("party names must not be blank");
            }
            if !seen.insert(name.as_str()) {
                bail!("party name {name} appears twice");
            }
        }
        Ok(())
    }
}
