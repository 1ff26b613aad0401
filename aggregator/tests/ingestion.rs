use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::PgPool;

use aggregator::consumer::{EventOutcome, IdempotentConsumer};
use aggregator::event::{RawEvent, ValidatedEvent};
use aggregator::store::{EventFilter, EventStore, InsertOutcome, PostgresEventStore, StatsDelta};

fn raw_event(topic: &str, event_id: &str) -> RawEvent {
    RawEvent {
        topic: topic.to_string(),
        event_id: event_id.to_string(),
        timestamp: "2025-12-24T01:00:00Z".to_string(),
        source: "integration-tests".to_string(),
        payload: json!({"user_id": 42}),
    }
}

fn validated_event(topic: &str, event_id: &str) -> ValidatedEvent {
    ValidatedEvent {
        topic: topic.to_string(),
        event_id: event_id.to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 12, 24, 1, 0, 0).unwrap(),
        source: "integration-tests".to_string(),
        payload: json!({"user_id": 42}),
    }
}

async fn row_count(db: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(db)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn conditional_insert_deduplicates(db: PgPool) {
    let store = PostgresEventStore::from_pool(db.clone());

    let first = store
        .insert_if_absent(&validated_event("user.login", "evt-1"))
        .await
        .unwrap();
    let second = store
        .insert_if_absent(&validated_event("user.login", "evt-1"))
        .await
        .unwrap();

    assert_eq!(first, InsertOutcome::Inserted);
    assert_eq!(second, InsertOutcome::AlreadyExists);
    assert_eq!(row_count(&db).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn topics_are_independent_dedup_scopes(db: PgPool) {
    let store = PostgresEventStore::from_pool(db.clone());

    let first = store
        .insert_if_absent(&validated_event("user.login", "evt-1"))
        .await
        .unwrap();
    let second = store
        .insert_if_absent(&validated_event("user.logout", "evt-1"))
        .await
        .unwrap();

    assert_eq!(first, InsertOutcome::Inserted);
    assert_eq!(second, InsertOutcome::Inserted);
    assert_eq!(row_count(&db).await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn racing_inserts_accept_exactly_one(db: PgPool) {
    let store = Arc::new(PostgresEventStore::from_pool(db.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .insert_if_absent(&validated_event("user.login", "evt-race"))
                .await
                .unwrap()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap() == InsertOutcome::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(row_count(&db).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_stat_increments_are_not_lost(db: PgPool) {
    let store = Arc::new(PostgresEventStore::from_pool(db));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..30 {
                store
                    .increment_stats(StatsDelta {
                        received: 1,
                        unique: 0,
                        duplicate: 1,
                    })
                    .await
                    .unwrap();
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.received, 150);
    assert_eq!(stats.duplicate_dropped, 150);
}

#[sqlx::test(migrations = "./migrations")]
async fn replayed_batch_settles_the_counters(db: PgPool) {
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::from_pool(db));
    let consumer = IdempotentConsumer::new(store.clone());

    let topics = ["user.login", "user.logout", "order.created", "order.completed", "payment.processed"];
    let batch: Vec<RawEvent> = (0..10)
        .map(|i| raw_event(topics[i % 5], &format!("evt-{i}")))
        .collect();

    let report = consumer.process_batch(&batch).await.unwrap();
    assert_eq!(report.processed, 10);
    assert_eq!(report.duplicates, 0);

    let replay: Vec<RawEvent> = batch
        .iter()
        .map(|e| {
            let mut e = e.clone();
            e.timestamp = "2025-12-24T09:30:00Z".to_string();
            e
        })
        .collect();

    let report = consumer.process_batch(&replay).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.duplicates, 10);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.received, 20);
    assert_eq!(stats.unique_processed, 10);
    assert_eq!(stats.duplicate_dropped, 10);
}

#[sqlx::test(migrations = "./migrations")]
async fn process_event_maps_outcomes(db: PgPool) {
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::from_pool(db));
    let consumer = IdempotentConsumer::new(store);

    let event = raw_event("user.login", "evt-1");
    assert_eq!(
        consumer.process_event(&event).await.unwrap(),
        EventOutcome::Accepted
    );
    assert_eq!(
        consumer.process_event(&event).await.unwrap(),
        EventOutcome::Duplicate
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn listing_is_newest_first_and_filterable(db: PgPool) {
    let store = PostgresEventStore::from_pool(db);

    for i in 0..6 {
        let topic = if i % 2 == 0 { "user.login" } else { "order.created" };
        store
            .insert_if_absent(&validated_event(topic, &format!("evt-{i}")))
            .await
            .unwrap();
    }

    let page = store
        .list_events(&EventFilter {
            topic: Some("user.login".to_string()),
            limit: 100,
            offset: 0,
        })
        .await
        .unwrap();

    assert_eq!(page.len(), 3);
    assert!(page.iter().all(|e| e.topic == "user.login"));
    assert!(page.windows(2).all(|w| w[0].processed_at >= w[1].processed_at));

    let page = store
        .list_events(&EventFilter {
            topic: None,
            limit: 4,
            offset: 4,
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    assert_eq!(store.topic_count().await.unwrap(), 2);
}
