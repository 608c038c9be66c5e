use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use tokio::sync::mpsc;

use crate::raft::{Message, NodeId, Target};

use super::{NetworkError, Transport};

type Mailboxes = BTreeMap<NodeId, mpsc::UnboundedSender<Message>>;

/// Fan-out over tokio mailboxes, one unbounded channel per node.
#[derive(Debug, Clone, Default)]
pub struct ChannelNetwork {
    mailboxes: Arc<RwLock<Mailboxes>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) the mailbox of `id`.
    pub fn register(&self, id: NodeId) -> (ChannelEndpoint, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let endpoint = ChannelEndpoint {
            from: id,
            network: self.clone(),
        };
        (endpoint, rx)
    }

    /// Drops the mailbox of `id`; later sends to it fail with `Disconnected`.
    pub fn disconnect(&self, id: NodeId) {
        if let Some(tx) = self
            .mailboxes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            let (closed, _) = mpsc::unbounded_channel();
            *tx = closed;
        }
    }

    fn deliver(&self, to: NodeId, message: Message) -> Result<(), NetworkError> {
        let mailboxes = self.mailboxes.read().unwrap_or_else(PoisonError::into_inner);
        let tx = mailboxes.get(&to).ok_or(NetworkError::UnknownPeer(to))?;
        tx.send(message)
            .map_err(|_| NetworkError::Disconnected(to))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    from: NodeId,
    network: ChannelNetwork,
}

impl Transport for ChannelEndpoint {
    fn send(&self, target: Target, message: Message) -> Result<(), NetworkError> {
        match target {
            Target::Node(to) => self.network.deliver(to, message),
            Target::All => {
                let peers: Vec<NodeId> = self
                    .network
                    .mailboxes
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .keys()
                    .copied()
                    .filter(|&id| id != self.from)
                    .collect();

                // A dead peer must not stop the broadcast reaching the rest.
                let mut result = Ok(());
                for to in peers {
                    if let Err(e) = self.network.deliver(to, message.clone()) {
                        debug!("Broadcast from {} skipped {to}: {e}", self.from);
                        result = Err(e);
                    }
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_other_mailbox() {
        let net = ChannelNetwork::new();
        let (a, mut rx_a) = net.register(1);
        let (_b, mut rx_b) = net.register(2);
        let (_c, mut rx_c) = net.register(3);

        let msg = Message::RequestVote {
            term: 1,
            candidate_id: 1,
        };
        a.send(Target::All, msg.clone()).expect("broadcast");

        assert_eq!(rx_b.recv().await, Some(msg.clone()));
        assert_eq!(rx_c.recv().await, Some(msg));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnected_peer_reports_error_but_others_still_receive() {
        let net = ChannelNetwork::new();
        let (a, _rx_a) = net.register(1);
        let (_b, _rx_b) = net.register(2);
        let (_c, mut rx_c) = net.register(3);
        net.disconnect(2);

        let msg = Message::Heartbeat {
            term: 2,
            leader_id: 1,
        };
        let err = a.send(Target::All, msg.clone()).unwrap_err();
        assert_eq!(err, NetworkError::Disconnected(2));
        assert_eq!(rx_c.recv().await, Some(msg.clone()));

        assert_eq!(
            a.send(Target::Node(7), msg).unwrap_err(),
            NetworkError::UnknownPeer(7)
        );
    }
}
