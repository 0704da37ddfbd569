use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::{
    BatchSource, DatePartition, InMemoryObjectStore, PublishError, RecordOutcome, ReplayPacer,
    StreamPublisher,
};
use xml_replay::{S3ReplaySource, SourceSettings};

#[derive(Debug, Clone, PartialEq)]
struct Published {
    stream: String,
    partition_key: String,
    records: Vec<String>,
}

#[derive(Default, Clone)]
struct RecordingPublisher {
    published: Arc<Mutex<Vec<Published>>>,
}

#[async_trait::async_trait]
impl StreamPublisher for RecordingPublisher {
    async fn publish_batch(
        &self,
        stream: &str,
        partition_key: &str,
        records: &[Bytes],
    ) -> Result<Vec<RecordOutcome>, PublishError> {
        self.published.lock().push(Published {
            stream: stream.to_string(),
            partition_key: partition_key.to_string(),
            records: records
                .iter()
                .map(|r| String::from_utf8_lossy(r).into_owned())
                .collect(),
        });

        Ok(records
            .iter()
            .enumerate()
            .map(|(i, _)| RecordOutcome::Delivered {
                sequence_number: i.to_string(),
                shard_id: format!("{stream}-0"),
            })
            .collect())
    }
}

fn key(day: u32, name: &str) -> String {
    format!("raw/ACOUSTIC/year=2023/month=01/day={day:02}/{name}")
}

fn settings(days: &[u32], cycle: bool) -> SourceSettings {
    SourceSettings {
        source_root: "raw".to_string(),
        reading_type: "ACOUSTIC".to_string(),
        days: days
            .iter()
            .map(|d| DatePartition::new(2023, 1, *d).unwrap())
            .collect(),
        cycle,
        download_concurrency: 2,
    }
}

#[tokio::test(start_paused = true)]
async fn replays_days_with_captured_gaps() {
    let store = Arc::new(InMemoryObjectStore::new("telemetry"));
    store.insert(key(1, "1672531200000_b.xml"), "<m>b</m>");
    store.insert(key(1, "1672531200000_a.xml"), "<m>a</m>");
    store.insert(key(1, "1672531200750_c.xml"), "<m>c</m>");
    store.insert(key(2, "1672531201750_d.xml"), "<m>d</m>");

    let publisher = RecordingPublisher::default();
    let mut source = S3ReplaySource::new(store, settings(&[1, 2], false));
    let mut pacer = ReplayPacer::new(publisher.clone(), "telemetry.replay", "ACOUSTIC");

    let started = tokio::time::Instant::now();
    let stats = pacer.run(&mut source).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1750));
    assert!(elapsed < Duration::from_millis(1850));
    assert_eq!(stats.batches_published, 3);
    assert_eq!(stats.records_delivered, 4);

    let published = publisher.published.lock().clone();
    assert_eq!(published[0].records, vec!["<m>a</m>", "<m>b</m>"]);
    assert_eq!(published[1].records, vec!["<m>c</m>"]);
    assert_eq!(published[2].records, vec!["<m>d</m>"]);
    assert!(published
        .iter()
        .all(|p| p.stream == "telemetry.replay" && p.partition_key == "ACOUSTIC"));
}

#[tokio::test]
async fn failed_download_is_dropped_from_its_batch() {
    let store = Arc::new(InMemoryObjectStore::new("telemetry"));
    store.insert(key(1, "1000_a.xml"), "a");
    store.insert(key(1, "1000_b.xml"), "b");
    store.fail_on(key(1, "1000_a.xml"));

    let mut source = S3ReplaySource::new(store, settings(&[1], false));
    let batch = source.next_batch().await.unwrap().unwrap();

    assert_eq!(batch.timestamp_ms, 1000);
    assert_eq!(batch.records, vec![Bytes::from_static(b"b")]);
    assert!(source.next_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn cycling_restarts_from_first_day() {
    let store = Arc::new(InMemoryObjectStore::new("telemetry"));
    store.insert(key(1, "1000_a.xml"), "a");
    store.insert(key(2, "2000_b.xml"), "b");
    store.insert(key(2, "2000_c.xml"), "c");

    let mut source = S3ReplaySource::new(store, settings(&[1, 2], true));
    let mut timestamps = Vec::new();
    for _ in 0..6 {
        let batch = source.next_batch().await.unwrap().unwrap();
        timestamps.push((batch.timestamp_ms, batch.records.len()));
    }

    assert_eq!(
        timestamps,
        vec![(1000, 1), (2000, 2), (1000, 1), (2000, 2), (1000, 1), (2000, 2)]
    );
}

#[tokio::test]
async fn missing_listing_ends_the_run() {
    struct BrokenStore;

    #[async_trait::async_trait]
    impl telemetry_core::ObjectStore for BrokenStore {
        fn bucket(&self) -> &str {
            "broken"
        }

        async fn list(
            &self,
            prefix: &str,
        ) -> Result<Vec<telemetry_core::ObjectDescriptor>, telemetry_core::ObjectStoreError>
        {
            Err(telemetry_core::ObjectStoreError::Transport {
                operation: "list",
                key: prefix.to_string(),
                message: "access denied".to_string(),
            })
        }

        async fn get(&self, key: &str) -> Result<Bytes, telemetry_core::ObjectStoreError> {
            Err(telemetry_core::ObjectStoreError::NotFound(key.to_string()))
        }

        async fn put(
            &self,
            _key: &str,
            _body: Vec<u8>,
            _content_type: &str,
        ) -> Result<(), telemetry_core::ObjectStoreError> {
            Ok(())
        }
    }

    let mut source = S3ReplaySource::new(Arc::new(BrokenStore), settings(&[1], false));
    let mut pacer = ReplayPacer::new(RecordingPublisher::default(), "telemetry.replay", "ACOUSTIC");

    let err = pacer.run(&mut source).await.unwrap_err();
    assert!(matches!(err, telemetry_core::ReplayError::Listing { .. }));
}
