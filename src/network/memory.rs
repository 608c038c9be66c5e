use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::raft::{Message, NodeId, Target};

use super::{NetworkError, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message,
}

#[derive(Debug, Default)]
struct Inner {
    members: BTreeSet<NodeId>,
    queue: Vec<Envelope>,
    journal: Option<Vec<Envelope>>,
}

/// In-process fan-out. Messages queue up until the driver takes them with
/// [`MemoryNetwork::take_pending`] and hands them to the target nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `id` to the broadcast set and returns its send endpoint.
    pub fn register(&self, id: NodeId) -> MemoryEndpoint {
        self.lock().members.insert(id);
        MemoryEndpoint {
            from: id,
            network: self.clone(),
        }
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.lock().members.iter().copied().collect()
    }

    /// Start keeping a copy of every envelope that passes through.
    pub fn record_journal(&self) {
        let mut inner = self.lock();
        if inner.journal.is_none() {
            inner.journal = Some(Vec::new());
        }
    }

    pub fn journal(&self) -> Vec<Envelope> {
        self.lock().journal.clone().unwrap_or_default()
    }

    /// Removes and returns everything queued so far, in send order.
    pub fn take_pending(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.lock().queue)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    fn push(&self, envelope: Envelope) {
        let mut inner = self.lock();
        if let Some(journal) = inner.journal.as_mut() {
            journal.push(envelope.clone());
        }
        inner.queue.push(envelope);
    }
}

/// A node's handle onto a [`MemoryNetwork`].
#[derive(Debug, Clone)]
pub struct MemoryEndpoint {
    from: NodeId,
    network: MemoryNetwork,
}

impl Transport for MemoryEndpoint {
    fn send(&self, target: Target, message: Message) -> Result<(), NetworkError> {
        match target {
            Target::All => {
                for to in self.network.members() {
                    if to != self.from {
                        self.network.push(Envelope {
                            from: self.from,
                            to,
                            message: message.clone(),
                        });
                    }
                }
                Ok(())
            }
            Target::Node(to) => {
                if !self.network.lock().members.contains(&to) {
                    return Err(NetworkError::UnknownPeer(to));
                }
                self.network.push(Envelope {
                    from: self.from,
                    to,
                    message,
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(leader_id: NodeId) -> Message {
        Message::Heartbeat { term: 1, leader_id }
    }

    #[test]
    fn broadcast_skips_sender() {
        let net = MemoryNetwork::new();
        let a = net.register(1);
        net.register(2);
        net.register(3);

        a.send(Target::All, heartbeat(1)).expect("broadcast");

        let targets: Vec<NodeId> = net.take_pending().into_iter().map(|e| e.to).collect();
        assert_eq!(targets, vec![2, 3]);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn unicast_to_unknown_peer_fails() {
        let net = MemoryNetwork::new();
        let a = net.register(1);

        let err = a.send(Target::Node(9), heartbeat(1)).unwrap_err();
        assert_eq!(err, NetworkError::UnknownPeer(9));
    }

    #[test]
    fn journal_survives_take_pending() {
        let net = MemoryNetwork::new();
        let a = net.register(1);
        net.register(2);
        net.record_journal();

        a.send(Target::Node(2), heartbeat(1)).expect("unicast");
        let _ = net.take_pending();

        assert_eq!(
            net.journal(),
            vec![Envelope {
                from: 1,
                to: 2,
                message: heartbeat(1)
            }]
        );
    }
}
