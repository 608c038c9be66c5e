use std::collections::{BTreeMap, BTreeSet};

use chronos_election::network::Envelope;
use chronos_election::raft::RotationConfig;
use chronos_election::{Config, DeliveryPolicy, Message, NodeId, Simulation, Term};
use proptest::prelude::*;

fn config(nodes: u64, seed: u64, rotation: bool) -> Config {
    Config {
        nodes,
        tick_interval_ms: 10,
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 299,
        rotation: rotation.then_some(RotationConfig {
            lease_ms: 400,
            cool_down_ms: 300,
        }),
        seed: Some(seed),
    }
}

/// (voter, term) -> candidates granted a vote
fn grants(journal: &[Envelope]) -> BTreeMap<(NodeId, Term), BTreeSet<NodeId>> {
    let mut grants: BTreeMap<(NodeId, Term), BTreeSet<NodeId>> = BTreeMap::new();
    for e in journal {
        if let Message::ResponseVote {
            term,
            voter_id,
            granted: true,
        } = e.message
        {
            grants.entry((voter_id, term)).or_default().insert(e.to);
        }
    }
    grants
}

/// term -> nodes that sent heartbeats in it
fn heartbeat_senders(journal: &[Envelope]) -> BTreeMap<Term, BTreeSet<NodeId>> {
    let mut leaders: BTreeMap<Term, BTreeSet<NodeId>> = BTreeMap::new();
    for e in journal {
        if let Message::Heartbeat { term, leader_id } = e.message {
            leaders.entry(term).or_default().insert(leader_id);
        }
    }
    leaders
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn election_safety_survives_reordering_and_duplication(
        seed in any::<u64>(),
        nodes in 3u64..=7,
        shuffle in any::<bool>(),
        duplicate_probability in 0.0f64..0.5,
        rotation in any::<bool>(),
        crash_at in proptest::option::of(30u64..200),
    ) {
        let mut sim = Simulation::from_config(&config(nodes, seed, rotation))
            .expect("valid config")
            .with_policy(DeliveryPolicy { shuffle, duplicate_probability });
        sim.network().record_journal();

        let mut last_terms: BTreeMap<NodeId, Term> = BTreeMap::new();
        for round in 0..300u64 {
            if crash_at == Some(round) {
                if let Some(&leader) = sim.leaders().first() {
                    sim.crash(leader);
                }
            }
            sim.step();

            for node in sim.nodes() {
                let previous = last_terms.insert(node.id(), node.current_term()).unwrap_or(0);
                prop_assert!(
                    node.current_term() >= previous,
                    "node {} went from term {} to {}", node.id(), previous, node.current_term()
                );
            }
        }

        let journal = sim.network().journal();

        for ((voter, term), candidates) in grants(&journal) {
            prop_assert!(
                candidates.len() == 1,
                "node {} granted votes to {:?} in term {}", voter, candidates, term
            );
        }

        let leaders = heartbeat_senders(&journal);
        for (term, senders) in &leaders {
            prop_assert!(
                senders.len() == 1,
                "term {} had several leaders: {:?}", term, senders
            );
        }
        prop_assert!(!leaders.is_empty(), "no leader was ever elected");
    }

    #[test]
    fn duplicated_requests_never_yield_a_second_grant(
        seed in any::<u64>(),
        duplicate_probability in 0.5f64..=1.0,
    ) {
        let mut sim = Simulation::from_config(&config(5, seed, false))
            .expect("valid config")
            .with_policy(DeliveryPolicy { shuffle: true, duplicate_probability });
        sim.network().record_journal();

        sim.run_until(200, |s| s.leaders().len() == 1);

        let journal = sim.network().journal();
        for ((voter, term), candidates) in grants(&journal) {
            prop_assert_eq!(candidates.len(), 1, "voter {} term {}", voter, term);
        }
    }
}
