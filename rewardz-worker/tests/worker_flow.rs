//! Integration Tests: Worker Bootstrap and Intake
//!
//! Boots a worker from configuration (rule file + SQLite on disk), feeds it
//! deliveries through the async intake loop, and checks dispositions,
//! publications and persisted state.

use std::sync::Arc;

use tokio::sync::mpsc;

use rewardz_core::RewardzConfig;
use rewardz_core::config::PersistenceBackend;
use rewardz_core::persistence::SqliteRepository;
use rewardz_core::{ActionResult, PlayerId, PlayerRepository};
use rewardz_worker::{ActionWorker, ChannelPublisher, Delivery, Disposition, Envelope, WorkerError};

const RULES: &str = r#"
[[elements]]
id = "ancient_scroll"
rarity = "rare"

[[rewards]]
id = "title_archivist"
type = "title"
value = "Archivist"
message = "The library remembers you"

[[quests]]
id = "archivist"
rule = "inventory['ancient_scroll'] >= 2"
reward = "title_archivist"

[actions_to_items_mapping]
read_book = "ancient_scroll"
"#;

fn config(dir: &std::path::Path) -> RewardzConfig {
    let rules_path = dir.join("game_rules.toml");
    std::fs::write(&rules_path, RULES).expect("write rules");

    let mut config = RewardzConfig::default();
    config.rules.path = rules_path;
    config.persistence.backend = PersistenceBackend::Sqlite;
    config.persistence.db_path = dir.join("players.db");
    config.transport.max_in_flight = 4;
    config
}

fn envelope(player: &str, action: &str, event_id: &str) -> Vec<u8> {
    Envelope {
        player_id: PlayerId::from(player),
        action: action.into(),
        event_id: Some(event_id.into()),
    }
    .encode()
    .expect("encode")
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[test]
fn missing_rule_file_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.rules.path = dir.path().join("nope.toml");

    let (publisher, _rx) = ChannelPublisher::new();
    let err = ActionWorker::from_config(&config, publisher).expect_err("no rules");
    assert!(matches!(err, WorkerError::Core(_)));
}

// ---------------------------------------------------------------------------
// Full intake: deliveries → dispositions → publications → SQLite
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn intake_loop_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path());
    let (publisher, mut published) = ChannelPublisher::new();
    let worker = Arc::new(ActionWorker::from_config(&config, publisher).expect("worker"));

    let (tx, rx) = mpsc::channel(8);
    let runner = tokio::spawn(Arc::clone(&worker).run(rx));

    let bodies = vec![
        envelope("hero", "read_book", "e1"),
        envelope("hero", "read_book", "e2"),
        envelope("hero", "read_book", "e2"),
        b"garbage".to_vec(),
        envelope("hero", "dance", "e3"),
    ];
    let mut dispositions = Vec::new();
    for body in bodies {
        let (delivery, reply) = Delivery::new(body);
        tx.send(delivery).await.expect("send");
        // One at a time so the order of effects is fixed.
        dispositions.push(reply.await.expect("reply"));
    }
    drop(tx);
    runner.await.expect("runner");

    assert_eq!(
        dispositions,
        vec![
            Disposition::Ack,
            Disposition::Ack,
            Disposition::Ack,
            Disposition::Reject,
            Disposition::Ack,
        ]
    );

    let mut results = Vec::new();
    while let Ok(message) = published.try_recv() {
        assert_eq!(message.player_id, PlayerId::from("hero"));
        let result: ActionResult = serde_json::from_slice(&message.body).expect("json");
        results.push(result);
    }
    assert_eq!(results.len(), 3);
    assert_eq!(results[1].rewards.len(), 2);
    assert!(results[2].rewards.is_empty());

    let stats = worker.stats();
    assert_eq!((stats.processed, stats.duplicates, stats.rejected), (3, 1, 1));

    drop(worker);
    let repo = SqliteRepository::open(&config.persistence.db_path, &config.persistence)
        .expect("reopen");
    let player = repo.get(&PlayerId::from("hero")).expect("load");
    assert_eq!(player.item_count("ancient_scroll"), 2);
    assert!(player.has_title("Archivist"));
    assert!(player.has_processed("e3"));
}
