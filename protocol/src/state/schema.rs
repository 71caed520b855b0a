//! Persisted projection of cash records.
//!
//! The vault never indexes `MyCash` directly. It asks the state for its
//! [`PersistentMyCash`] row and indexes that, keyed by currency, which is
//! exactly the filter coin selection needs.

use serde::{Deserialize, Serialize};

use super::cash::MyCash;
use crate::config::{MYCASH_SCHEMA_NAME, MYCASH_SCHEMA_VERSION};
use crate::identity::AbstractParty;

/// Name and version of a projection schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedSchema {
    pub name: &'static str,
    pub version: u32,
}

/// Row in the `mycash_states` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentMyCash {
    pub issuer: String,
    pub owner: String,
    pub amount: u64,
    pub currency_code: String,
}

impl PersistentMyCash {
    /// Index key prefix for this row's currency.
    pub fn currency_index_prefix(&self) -> Vec<u8> {
        self.currency_code.as_bytes().to_vec()
    }
}

/// States that can be projected into a queryable schema.
pub trait QueryableState {
    fn supported_schemas(&self) -> Vec<MappedSchema>;

    fn generate_mapped_object(&self, schema: &MappedSchema) -> Option<PersistentMyCash>;
}

pub const MYCASH_SCHEMA_V1: MappedSchema = MappedSchema {
    name: MYCASH_SCHEMA_NAME,
    version: MYCASH_SCHEMA_VERSION,
};

fn render_party(party: &AbstractParty) -> String {
    match party.name_or_none() {
        Some(name) => name.to_string(),
        None => party.owning_key().to_base58(),
    }
}

impl QueryableState for MyCash {
    fn supported_schemas(&self) -> Vec<MappedSchema> {
        vec![MYCASH_SCHEMA_V1]
    }

    fn generate_mapped_object(&self, schema: &MappedSchema) -> Option<PersistentMyCash> {
        if *schema != MYCASH_SCHEMA_V1 {
            return None;
        }
        Some(PersistentMyCash {
            issuer: render_party(self.issuer()),
            owner: render_party(self.owner()),
            amount: self.amount(),
            currency_code: self.currency().as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PartyKeypair;
    use crate::identity::{AnonymousParty, Party};
    use crate::state::CurrencyCode;

    #[test]
    fn projects_names_and_keys() {
        let bank = Party::new("Bank", PartyKeypair::generate().public_key());
        let anon = AnonymousParty::new(PartyKeypair::generate().public_key());
        let cash = MyCash::new(bank, anon, 250, CurrencyCode::new("GBP").unwrap()).unwrap();

        let row = cash.generate_mapped_object(&MYCASH_SCHEMA_V1).unwrap();
        assert_eq!(row.issuer, "Bank");
        assert_eq!(row.owner, anon.owning_key().to_base58());
        assert_eq!(row.amount, 250);
        assert_eq!(row.currency_code, "GBP");
        assert_eq!(row.currency_index_prefix(), b"GBP".to_vec());
    }

    #[test]
    fn unknown_schema_version_yields_nothing() {
        let bank = Party::new("Bank", PartyKeypair::generate().public_key());
        let alice = Party::new("Alice", PartyKeypair::generate().public_key());
        let cash = MyCash::new(bank, alice, 1, CurrencyCode::new("USD").unwrap()).unwrap();
        let v2 = MappedSchema {
            name: MYCASH_SCHEMA_NAME,
            version: 2,
        };
        assert!(cash.generate_mapped_object(&v2).is_none());
        assert_eq!(cash.supported_schemas(), vec![MYCASH_SCHEMA_V1]);
    }
}
