//! In-process message routing.
//!
//! Each party registers an inbox under its name. A request carries a
//! `oneshot` sender for its reply, which is the whole of correlation: the
//! caller awaits exactly the reply to its own request.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::messages::{Message, Response};
use super::NetworkError;
use crate::identity::Party;

/// A request waiting in a party's inbox.
#[derive(Debug)]
pub struct InboundRequest {
    pub from: Party,
    pub message: Message,
    reply: oneshot::Sender<Response>,
}

impl InboundRequest {
    /// Send the reply. A caller that gave up (timed out) is not an error.
    pub fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            debug!(from = %self.from, "caller went away before the reply");
        }
    }
}

/// Shared routing table.
#[derive(Clone, Default)]
pub struct Network {
    inboxes: Arc<DashMap<String, mpsc::Sender<InboundRequest>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `party`'s inbox, replacing any previous one.
    pub fn register(&self, party: &Party, capacity: usize) -> mpsc::Receiver<InboundRequest> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.inboxes.insert(party.name().to_string(), tx);
        rx
    }

    /// Take `name` off the network. Later sends fail with `UnknownParty`.
    pub fn deregister(&self, name: &str) -> bool {
        self.inboxes.remove(name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.inboxes.contains_key(name)
    }

    pub fn party_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inboxes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Open a session from `from` to `counterparty`.
    pub fn session(&self, from: &Party, counterparty: &Party, timeout: Duration) -> Session {
        Session {
            network: self.clone(),
            from: from.clone(),
            counterparty: counterparty.clone(),
            timeout,
        }
    }
}

/// One side of a conversation with a counterparty.
pub struct Session {
    network: Network,
    from: Party,
    counterparty: Party,
    timeout: Duration,
}

impl Session {
    pub fn counterparty(&self) -> &Party {
        &self.counterparty
    }

    /// Send `message` and wait for the reply, at most the session timeout
    /// in total.
    pub async fn send_and_receive(&self, message: Message) -> Result<Response, NetworkError> {
        let name = self.counterparty.name().to_string();
        let inbox = self
            .network
            .inboxes
            .get(&name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NetworkError::UnknownParty { party: name.clone() })?;

        let kind = message.kind();
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = InboundRequest {
            from: self.from.clone(),
            message,
            reply: reply_tx,
        };

        debug!(from = %self.from, to = %name, kind, "sending");
        let exchange = async {
            inbox
                .send(request)
                .await
                .map_err(|_| NetworkError::Disconnected { party: name.clone() })?;
            reply_rx
                .await
                .map_err(|_| NetworkError::Disconnected { party: name.clone() })
        };
        let outcome = tokio::time::timeout(self.timeout, exchange).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    to = %name,
                    kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "no reply in time"
                );
                Err(NetworkError::Timeout {
                    party: name,
                    after_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PartyKeypair;
    use crate::identity::{AnonymousParty, IdentityCertificate};

    fn party(name: &str) -> (Party, PartyKeypair) {
        let kp = PartyKeypair::generate();
        (Party::new(name, kp.public_key()), kp)
    }

    fn cert(owner: &Party, kp: &PartyKeypair) -> IdentityCertificate {
        let anon = AnonymousParty::new(PartyKeypair::generate().public_key());
        IdentityCertificate::issue(owner, kp, anon).unwrap()
    }

    #[tokio::test]
    async fn request_reaches_inbox_and_reply_returns() {
        let network = Network::new();
        let (alice, _) = party("Alice");
        let (bob, bob_kp) = party("Bob");
        let mut inbox = network.register(&bob, 8);

        let reply = cert(&bob, &bob_kp);
        let expected = reply.clone();
        tokio::spawn(async move {
            if let Some(request) = inbox.recv().await {
                assert_eq!(request.from.name(), "Alice");
                request.respond(Response::Identity(reply));
            }
        });

        let session = network.session(&alice, &bob, Duration::from_secs(1));
        match session.send_and_receive(Message::RegisterIdentity(expected.clone())).await {
            Ok(Response::Identity(got)) => assert_eq!(got, expected),
            other => panic!("expected Identity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_party_fails_fast() {
        let network = Network::new();
        let (alice, alice_kp) = party("Alice");
        let (ghost, _) = party("Ghost");
        let session = network.session(&alice, &ghost, Duration::from_secs(1));
        match session
            .send_and_receive(Message::RegisterIdentity(cert(&alice, &alice_kp)))
            .await
        {
            Err(NetworkError::UnknownParty { party }) => assert_eq!(party, "Ghost"),
            other => panic!("expected UnknownParty, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_counterparty_times_out() {
        let network = Network::new();
        let (alice, alice_kp) = party("Alice");
        let (bob, _) = party("Bob");
        // Held but never read.
        let _inbox = network.register(&bob, 8);

        let session = network.session(&alice, &bob, Duration::from_millis(200));
        match session
            .send_and_receive(Message::RegisterIdentity(cert(&alice, &alice_kp)))
            .await
        {
            Err(NetworkError::Timeout { after_ms: 200, .. }) => {}
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropped_inbox_is_a_disconnect() {
        let network = Network::new();
        let (alice, alice_kp) = party("Alice");
        let (bob, _) = party("Bob");
        drop(network.register(&bob, 8));

        let session = network.session(&alice, &bob, Duration::from_secs(1));
        assert!(matches!(
            session
                .send_and_receive(Message::RegisterIdentity(cert(&alice, &alice_kp)))
                .await,
            Err(NetworkError::Disconnected { .. })
        ));
    }

    #[test]
    fn deregistered_party_disappears() {
        let network = Network::new();
        let (bob, _) = party("Bob");
        let _inbox = network.register(&bob, 1);
        assert_eq!(network.party_names(), vec!["Bob".to_string()]);
        assert!(network.deregister("Bob"));
        assert!(!network.is_registered("Bob"));
    }
}
