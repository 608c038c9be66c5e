use std::time::Duration;

use chronos_election::raft::NodeRole;
use chronos_election::{Config, LocalCluster};
use tokio::time::sleep;

fn fast_config(seed: u64) -> Config {
    Config {
        nodes: 3,
        tick_interval_ms: 20,
        election_timeout_min_ms: 150,
        election_timeout_max_ms: 299,
        rotation: None,
        seed: Some(seed),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_node_cluster_elects_and_fails_over() {
    let mut cluster = LocalCluster::start(fast_config(17)).expect("start cluster");

    let leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("no leader elected");

    // Let heartbeats reach everyone
    sleep(Duration::from_millis(200)).await;
    let statuses = cluster.statuses();
    let leader_term = statuses
        .iter()
        .find(|s| s.id == leader)
        .map(|s| s.term)
        .expect("leader status");
    assert!(statuses
        .iter()
        .filter(|s| s.id != leader)
        .all(|s| s.role != NodeRole::Leader));

    assert!(cluster.crash(leader));

    let mut new_leader = None;
    for _ in 0..250 {
        sleep(Duration::from_millis(20)).await;
        let leaders = cluster.leaders();
        if leaders.len() == 1 && leaders[0] != leader {
            new_leader = Some(leaders[0]);
            break;
        }
    }
    let new_leader = new_leader.expect("no new leader after crash");

    let new_term = cluster
        .statuses()
        .into_iter()
        .find(|s| s.id == new_leader)
        .map(|s| s.term)
        .expect("new leader status");
    assert!(new_term > leader_term);

    cluster.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarted_node_rejoins_as_follower() {
    let mut cluster = LocalCluster::start(fast_config(5)).expect("start cluster");
    let leader = cluster
        .wait_for_leader(Duration::from_secs(5))
        .await
        .expect("no leader elected");

    let follower = cluster
        .node_ids()
        .into_iter()
        .find(|&id| id != leader)
        .expect("a follower");
    assert!(cluster.crash(follower));
    assert!(cluster.restart(follower).expect("restart"));

    let mut rejoined = false;
    for _ in 0..100 {
        sleep(Duration::from_millis(20)).await;
        let status = cluster
            .statuses()
            .into_iter()
            .find(|s| s.id == follower)
            .expect("follower status");
        if status.term > 0 && status.leader_id.is_some() {
            rejoined = true;
            break;
        }
    }
    assert!(rejoined, "restarted node never followed a leader");

    assert!(!cluster.crash(99));
    cluster.shutdown();
}

#[test]
fn empty_cluster_is_rejected_before_start() {
    let config = Config {
        nodes: 0,
        ..fast_config(1)
    };
    assert!(LocalCluster::start(config).is_err());
}
