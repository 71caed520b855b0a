//! # Demo Scenario
//!
//! A scripted walk through the ledger on a booted roster:
//!
//! ```text
//! 1. BankA issues 100 USD and 50 GBP to Alice, BankB issues 80 USD to Bob
//! 2. Alice moves 10 + 28 USD and 35 GBP to Bob     (change 62 USD, 15 GBP)
//! 3. Bob moves 20 BankB USD to Alice anonymously
//! 4. Bob exits the BankA USD he received
//! ```
//!
//! Needs at least `BankA`, `BankB`, `Alice` and `Bob` on the roster.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use mycash_protocol::flows::MyCashData;
use mycash_protocol::identity::Party;
use mycash_protocol::state::CurrencyCode;
use mycash_protocol::vault::CashQuery;

use crate::roster::Roster;

/// Per-party holdings once the scenario has run, in well-known terms.
#[derive(Debug, Serialize)]
pub struct ScenarioReport {
    pub transactions: Vec<String>,
    pub holdings: BTreeMap<String, Vec<String>>,
}

struct Cast {
    bank_a: Party,
    bank_b: Party,
    alice: Party,
    bob: Party,
}

fn cast(roster: &Roster) -> Result<Cast> {
    let get = |name: &str| {
        roster
            .party(name)
            .ok_or_else(|| anyhow!("demo needs a party named {name} on the roster"))
    };
    Ok(Cast {
        bank_a: get("BankA")?,
        bank_b: get("BankB")?,
        alice: get("Alice")?,
        bob: get("Bob")?,
    })
}

fn ccy(code: &str) -> Result<CurrencyCode> {
    CurrencyCode::new(code).map_err(|e| anyhow!(e))
}

pub async fn run(roster: &Roster) -> Result<ScenarioReport> {
    let c = cast(roster)?;
    let (usd, gbp) = (ccy("USD")?, ccy("GBP")?);
    let mut transactions = Vec::new();

    let issued = roster
        .issue(
            "BankA",
            None,
            vec![
                MyCashData::new(&c.bank_a, &c.alice, 100, usd.clone()),
                MyCashData::new(&c.bank_a, &c.alice, 50, gbp.clone()),
            ],
            false,
        )
        .await
        .context("BankA issuance")?;
    transactions.push(format!("issue {} seq={}", issued.id(), issued.sequence));

    let issued = roster
        .issue(
            "BankB",
            None,
            vec![MyCashData::new(&c.bank_b, &c.bob, 80, usd.clone())],
            false,
        )
        .await
        .context("BankB issuance")?;
    transactions.push(format!("issue {} seq={}", issued.id(), issued.sequence));

    let moved = roster
        .move_cash(
            "Alice",
            None,
            vec![
                MyCashData::new(&c.bank_a, &c.alice, 10, usd.clone()),
                MyCashData::new(&c.bank_a, &c.alice, 28, usd.clone()),
                MyCashData::new(&c.bank_a, &c.alice, 35, gbp),
            ],
            &c.bob,
            false,
        )
        .await
        .context("Alice pays Bob")?;
    transactions.push(format!("move {} seq={}", moved.id(), moved.sequence));

    let moved = roster
        .move_cash(
            "Bob",
            None,
            vec![MyCashData::new(&c.bank_b, &c.bob, 20, usd.clone())],
            &c.alice,
            true,
        )
        .await
        .context("Bob pays Alice anonymously")?;
    transactions.push(format!("move {} seq={}", moved.id(), moved.sequence));

    let bob = roster
        .node("Bob")
        .ok_or_else(|| anyhow!("Bob is not hosted"))?;
    let to_exit: Vec<_> = bob
        .vault()
        .query_unspent(&CashQuery::owned_by(&c.bob).issued_by(&c.bank_a).in_currency(usd))?
        .into_iter()
        .map(|s| s.reference)
        .collect();
    let exited = roster
        .exit("Bob", None, to_exit)
        .await
        .context("Bob exits BankA USD")?;
    transactions.push(format!("exit {} seq={}", exited.id(), exited.sequence));

    let mut holdings = BTreeMap::new();
    for node in roster.nodes() {
        let lines = node
            .known_holdings(&CashQuery::default())?
            .into_iter()
            .map(|h| format!("{} {} from {}", h.data.amount, h.data.currency, h.data.issuer))
            .collect();
        holdings.insert(node.identity().name().to_string(), lines);
    }
    tracing::info!(transactions = transactions.len(), "demo scenario finished");
    Ok(ScenarioReport {
        transactions,
        holdings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::metrics::NodeMetrics;
    use std::sync::Arc;

    #[tokio::test]
    async fn demo_leaves_the_expected_holdings() {
        let roster = Roster::boot(&NodeConfig::default(), Arc::new(NodeMetrics::new())).unwrap();
        let report = run(&roster).await.unwrap();
        assert_eq!(report.transactions.len(), 5);

        let mut alice = report.holdings["Alice"].clone();
        alice.sort();
        assert_eq!(
            alice,
            vec!["15 GBP from BankA", "20 USD from BankB", "62 USD from BankA"]
        );
        let mut bob = report.holdings["Bob"].clone();
        bob.sort();
        assert_eq!(bob, vec!["35 GBP from BankA", "60 USD from BankB"]);
        assert!(report.holdings["BankA"].is_empty());
        roster.shutdown();
    }

    #[tokio::test]
    async fn demo_needs_its_cast() {
        let config = NodeConfig {
            parties: vec!["Solo".to_string()],
            ..NodeConfig::default()
        };
        let roster = Roster::boot(&config, Arc::new(NodeMetrics::new())).unwrap();
        assert!(run(&roster).await.is_err());
        roster.shutdown();
    }
}
