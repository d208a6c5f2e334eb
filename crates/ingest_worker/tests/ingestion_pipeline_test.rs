use async_trait::async_trait;
use bytes::Bytes;
use common::domain::{
    DeliveryError, DeliveryFuture, DeliveryReceipt, FetchError, ObjectStore, OutboundRecord,
    RecordSink,
};
use futures::FutureExt;
use ingest_worker::domain::{
    IngestionService, IngestionServiceConfig, NotificationItem, RoutingFailurePolicy, TopicRouter,
};
use ingest_worker::nats::process_notifications;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bucket contents keyed by `(bucket, decoded key)`
#[derive(Default)]
struct InMemoryObjectStore {
    objects: HashMap<(String, String), String>,
}

impl InMemoryObjectStore {
    fn with_object(mut self, bucket: &str, key: &str, text: &str) -> Self {
        self.objects
            .insert((bucket.to_string(), key.to_string()), text.to_string());
        self
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|text| Bytes::from(text.clone()))
            .ok_or_else(|| FetchError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

/// Appends records to per-topic logs; topics listed in `unauthorized` fail delivery
#[derive(Default)]
struct InMemorySink {
    topics: Mutex<HashMap<String, Vec<OutboundRecord>>>,
    unauthorized: Vec<String>,
}

impl InMemorySink {
    fn records(&self, topic: &str) -> Vec<OutboundRecord> {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

impl RecordSink for InMemorySink {
    fn enqueue(&self, record: &OutboundRecord) -> Result<DeliveryFuture, DeliveryError> {
        if self.unauthorized.contains(&record.topic) {
            return Ok(async { Err(DeliveryError::Broker("topic authorization failed".to_string())) }
                .boxed());
        }

        let mut topics = self.topics.lock().unwrap();
        let log = topics.entry(record.topic.clone()).or_default();
        log.push(record.clone());
        let offset = log.len() as i64 - 1;

        Ok(async move {
            Ok(DeliveryReceipt {
                partition: 0,
                offset,
            })
        }
        .boxed())
    }

    fn flush(&self, _timeout: Duration) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn telemetry_line(ha_id: &str, kind: &str, region: &str, seq: u32) -> String {
    json!({
        "app": {
            "context": { "haId": ha_id },
            "cdlConfig": { "type": kind, "region": region }
        },
        "seq": seq
    })
    .to_string()
}

fn storage_event(bucket: &str, key: &str) -> serde_json::Value {
    json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": { "name": bucket },
                "object": { "key": key, "size": 1024 }
            }
        }]
    })
}

fn direct_item(id: &str, bucket: &str, key: &str) -> NotificationItem {
    NotificationItem {
        message_id: id.to_string(),
        body: Bytes::from(storage_event(bucket, key).to_string()),
    }
}

fn wrapped_item(id: &str, bucket: &str, key: &str) -> NotificationItem {
    let envelope = json!({
        "Type": "Notification",
        "MessageId": "9f5e0b6c-2d4b-4c55-9d43-4a3c0f1e2b7a",
        "Message": storage_event(bucket, key).to_string(),
    });
    NotificationItem {
        message_id: id.to_string(),
        body: Bytes::from(envelope.to_string()),
    }
}

fn service(store: InMemoryObjectStore, sink: Arc<InMemorySink>) -> IngestionService {
    IngestionService::new(
        Arc::new(store),
        sink,
        TopicRouter::new("cdl"),
        IngestionServiceConfig {
            drain_timeout: Duration::from_secs(2),
            routing_failure_policy: RoutingFailurePolicy::Skip,
        },
    )
}

#[tokio::test]
async fn test_batch_fans_out_records_by_type_and_region() {
    let first = [
        telemetry_line("ha-1", "log", "eu", 1),
        "{ truncated".to_string(),
        telemetry_line("ha-2", "metric", "eu", 2),
    ]
    .join("\n");
    let second = [
        telemetry_line("ha-3", "log", "us", 3),
        String::new(),
        telemetry_line("ha-1", "log", "eu", 4),
    ]
    .join("\n");

    let store = InMemoryObjectStore::default()
        .with_object("landing", "2024/01/first batch.ndjson", &first)
        .with_object("landing", "2024/01/second+part.ndjson", &second);
    let sink = Arc::new(InMemorySink::default());
    let service = service(store, Arc::clone(&sink));

    let result = service
        .handle_batch(vec![
            direct_item("storage_notifications.landing#0", "landing", "2024%2F01%2Ffirst+batch.ndjson"),
            wrapped_item("storage_notifications.landing#1", "landing", "2024/01/second%2Bpart.ndjson"),
        ])
        .await;

    assert!(result.is_success());
    assert_eq!(result.stats.items, 2);
    assert_eq!(result.stats.storage_events, 2);
    assert_eq!(result.stats.invalid_lines, 1);
    assert_eq!(result.stats.records_submitted, 4);
    assert_eq!(result.stats.records_delivered, 4);

    let eu_logs = sink.records("cdl_log_eu");
    assert_eq!(eu_logs.len(), 2);
    assert_eq!(eu_logs[0].key, "ha-1");
    assert_eq!(eu_logs[0].value, telemetry_line("ha-1", "log", "eu", 1));
    assert_eq!(eu_logs[1].value, telemetry_line("ha-1", "log", "eu", 4));
    assert_eq!(sink.records("cdl_metric_eu").len(), 1);
    assert_eq!(sink.records("cdl_log_us")[0].key, "ha-3");
}

#[tokio::test]
async fn test_only_failed_items_are_redelivered() {
    let store = InMemoryObjectStore::default()
        .with_object("landing", "ok.ndjson", &telemetry_line("ha-1", "log", "eu", 1))
        .with_object("landing", "restricted.ndjson", &telemetry_line("ha-2", "audit", "eu", 2));
    let sink = Arc::new(InMemorySink {
        unauthorized: vec!["cdl_audit_eu".to_string()],
        ..Default::default()
    });
    let service = service(store, Arc::clone(&sink));

    let processing = process_notifications(
        &service,
        vec![
            direct_item("storage_notifications.landing#0", "landing", "ok.ndjson"),
            direct_item("storage_notifications.landing#1", "landing", "restricted.ndjson"),
            direct_item("storage_notifications.landing#2", "landing", "deleted.ndjson"),
            NotificationItem {
                message_id: "storage_notifications.landing#3".to_string(),
                body: Bytes::from_static(b"<xml/>"),
            },
            direct_item("storage_notifications.landing#4", "landing", "ok.ndjson"),
        ],
    )
    .await;

    assert_eq!(processing.ack, vec![0, 4]);
    let nak_indices: Vec<_> = processing.nak.iter().map(|(index, _)| *index).collect();
    assert_eq!(nak_indices, vec![1, 2, 3]);
    assert!(processing.nak.iter().all(|(_, reason)| reason.is_some()));
    assert_eq!(sink.records("cdl_log_eu").len(), 2);
}
