//! Replication into a Postgres read store.
//!
//! The write side is the in-memory repository so that the projected tables
//! start empty; the read side is the real `PgProjectionStore`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use healthtrack_bus::EventBusClient;
use healthtrack_core::clock::Clock;
use healthtrack_core::record::{ActivityFields, SleepFields};
use healthtrack_core::repository::{ProjectionStore, RecordRepository};
use healthtrack_core::{Category, Mutation, RecordFields};
use healthtrack_replication::{ReplicationConsumer, ReplicationPublisher};
use healthtrack_store::{DualStore, PgProjectionStore, PgRecordRepository};
use healthtrack_test_support::{FixedClock, InMemoryRecordRepository};
use sqlx::PgPool;

struct Pipeline {
    writes: InMemoryRecordRepository,
    publisher: ReplicationPublisher,
    consumer: ReplicationConsumer,
    projection: Arc<PgProjectionStore>,
}

async fn pipeline(pool: &PgPool) -> Pipeline {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::morning());
    let writes = InMemoryRecordRepository::new(Arc::clone(&clock));
    let bus = Arc::new(EventBusClient::in_memory());
    let projection = Arc::new(PgProjectionStore::new(pool.clone()));
    let consumer = ReplicationConsumer::new(projection.clone(), None);
    consumer.start(&bus).await.unwrap();
    let publisher = ReplicationPublisher::new(bus, writes.outbox(), clock, None);
    Pipeline {
        writes,
        publisher,
        consumer,
        projection,
    }
}

async fn wait_for_row(projection: &PgProjectionStore, category: Category, id: i64, present: bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while projection.find(category, id).await.unwrap().is_some() != present {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

fn sleep_fields() -> RecordFields {
    RecordFields::Sleep(SleepFields {
        start_time: Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
        quality: 4,
    })
}

#[sqlx::test(migrations = "../../migrations/write")]
async fn test_created_row_is_projected_unchanged(pool: PgPool) {
    // Arrange
    let p = pipeline(&pool).await;
    let committed = p
        .writes
        .create(
            9,
            RecordFields::Activity(ActivityFields::new(
                "swimming".into(),
                45,
                4,
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            )),
        )
        .await
        .unwrap();
    let id = committed.value.id();

    // Act
    let delivered = p
        .publisher
        .record_mutated(&committed.value, Mutation::Created, committed.outbox_id)
        .await;
    wait_for_row(&p.projection, Category::Activity, id, true).await;

    // Assert
    assert!(delivered);
    let projected = p.projection.find(Category::Activity, id).await.unwrap();
    assert_eq!(projected, Some(committed.value));
    p.consumer.stop(Duration::from_secs(1)).await;
}

#[sqlx::test(migrations = "../../migrations/write")]
async fn test_sleep_row_reads_back_with_eight_hours(pool: PgPool) {
    // Arrange
    let p = pipeline(&pool).await;
    let committed = p.writes.create(9, sleep_fields()).await.unwrap();
    let id = committed.value.id();

    // Act
    p.publisher
        .record_mutated(&committed.value, Mutation::Created, committed.outbox_id)
        .await;
    wait_for_row(&p.projection, Category::Sleep, id, true).await;
    let reads = PgRecordRepository::new(
        DualStore::from_pools(pool.clone(), pool),
        Arc::new(FixedClock::morning()),
    );
    let listed = reads.list(9, Category::Sleep).await.unwrap();

    // Assert
    let healthtrack_core::DomainRecord::Sleep(row) = &listed[0] else {
        panic!("expected a sleep row, got {listed:?}");
    };
    assert_eq!(row.id, 1);
    assert_eq!(row.fields.quality, 4);
    assert!((row.fields.duration_hours() - 8.0).abs() < f64::EPSILON);
    p.consumer.stop(Duration::from_secs(1)).await;
}

#[sqlx::test(migrations = "../../migrations/write")]
async fn test_delete_removes_projected_row(pool: PgPool) {
    // Arrange
    let p = pipeline(&pool).await;
    let committed = p.writes.create(9, sleep_fields()).await.unwrap();
    let id = committed.value.id();
    p.publisher
        .record_mutated(&committed.value, Mutation::Created, committed.outbox_id)
        .await;
    wait_for_row(&p.projection, Category::Sleep, id, true).await;

    // Act
    let deleted = p.writes.delete(9, Category::Sleep, id).await.unwrap();
    p.publisher
        .record_deleted(Category::Sleep, id, deleted.outbox_id)
        .await;
    wait_for_row(&p.projection, Category::Sleep, id, false).await;

    // Assert
    assert_eq!(p.writes.outbox().dispatched_ids(), vec![1, 2]);
    p.consumer.stop(Duration::from_secs(1)).await;
}
