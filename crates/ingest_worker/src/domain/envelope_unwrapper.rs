use crate::domain::{IngestError, IngestResult};
use common::domain::StorageEventRecord;
use serde::Deserialize;
use serde_json::Value;

/// Pub/sub envelopes carry the storage event as a JSON string in this field
const MESSAGE_FIELD: &str = "Message";
const RECORDS_FIELD: &str = "Records";

#[derive(Deserialize)]
struct StorageEventWire {
    #[serde(rename = "eventName")]
    event_name: Option<String>,
    s3: StorageEntityWire,
}

#[derive(Deserialize)]
struct StorageEntityWire {
    bucket: BucketWire,
    object: ObjectWire,
}

#[derive(Deserialize)]
struct BucketWire {
    name: String,
}

#[derive(Deserialize)]
struct ObjectWire {
    key: String,
    size: Option<u64>,
}

/// Extract the storage-event records from one notification body
///
/// The body is either a storage-event notification itself or a pub/sub
/// envelope whose `Message` field holds one as an embedded JSON string.
/// A notification without `Records` (or with an empty list) yields no records.
pub fn unwrap_notification(raw_body: &str) -> IngestResult<Vec<StorageEventRecord>> {
    let outer: Value = serde_json::from_str(raw_body).map_err(IngestError::MalformedEnvelope)?;
    let Value::Object(outer) = outer else {
        return Err(IngestError::EnvelopeNotObject);
    };

    let event = match outer.get(MESSAGE_FIELD) {
        Some(Value::String(embedded)) => {
            match serde_json::from_str(embedded).map_err(IngestError::MalformedEmbeddedMessage)? {
                Value::Object(inner) => inner,
                _ => return Err(IngestError::EnvelopeNotObject),
            }
        }
        Some(_) => return Err(IngestError::MessageNotText),
        None => outer,
    };

    let candidates = match event.get(RECORDS_FIELD) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(candidates)) => candidates,
        Some(_) => return Err(IngestError::RecordsNotList),
    };

    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let wire = StorageEventWire::deserialize(candidate)
                .map_err(|source| IngestError::MalformedStorageEvent { index, source })?;
            Ok(StorageEventRecord {
                bucket: wire.s3.bucket.name,
                key: wire.s3.object.key,
                event_name: wire.event_name,
                size: wire.s3.object.size,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storage_event() -> Value {
        json!({
            "Records": [
                {
                    "eventName": "ObjectCreated:Put",
                    "s3": {
                        "bucket": { "name": "cdl-landing" },
                        "object": { "key": "logs/2024/part%2B1.json", "size": 512 }
                    }
                },
                {
                    "eventName": "ObjectCreated:Put",
                    "s3": {
                        "bucket": { "name": "cdl-landing" },
                        "object": { "key": "logs/2024/part2.json" }
                    }
                }
            ]
        })
    }

    #[test]
    fn test_direct_notification_yields_listed_records() {
        let records = unwrap_notification(&storage_event().to_string()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bucket, "cdl-landing");
        assert_eq!(records[0].key, "logs/2024/part%2B1.json");
        assert_eq!(records[0].event_name.as_deref(), Some("ObjectCreated:Put"));
        assert_eq!(records[0].size, Some(512));
        assert_eq!(records[1].key, "logs/2024/part2.json");
        assert_eq!(records[1].size, None);
    }

    #[test]
    fn test_pubsub_envelope_yields_embedded_records() {
        let envelope = json!({
            "Type": "Notification",
            "TopicArn": "arn:aws:sns:eu-west-1:123456789012:landing",
            "Message": storage_event().to_string(),
        });

        let records = unwrap_notification(&envelope.to_string()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key, "logs/2024/part2.json");
    }

    #[test]
    fn test_notification_without_records_is_empty() {
        let test_event = json!({ "Service": "Amazon S3", "Event": "s3:TestEvent" });

        assert!(unwrap_notification(&test_event.to_string()).unwrap().is_empty());
        assert!(unwrap_notification(r#"{"Records": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_top_level_json_is_fatal() {
        let result = unwrap_notification("{not json");
        assert!(matches!(result, Err(IngestError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_malformed_embedded_message_is_fatal() {
        let envelope = json!({ "Message": "{\"Records\": [" });

        let result = unwrap_notification(&envelope.to_string());
        assert!(matches!(result, Err(IngestError::MalformedEmbeddedMessage(_))));
    }

    #[test]
    fn test_non_string_message_is_fatal() {
        let envelope = json!({ "Message": { "Records": [] } });

        let result = unwrap_notification(&envelope.to_string());
        assert!(matches!(result, Err(IngestError::MessageNotText)));
    }

    #[test]
    fn test_non_object_body_is_fatal() {
        assert!(matches!(
            unwrap_notification("[1, 2, 3]"),
            Err(IngestError::EnvelopeNotObject)
        ));
    }

    #[test]
    fn test_record_without_object_key_is_fatal() {
        let event = json!({
            "Records": [{ "s3": { "bucket": { "name": "cdl-landing" }, "object": {} } }]
        });

        let result = unwrap_notification(&event.to_string());
        assert!(matches!(
            result,
            Err(IngestError::MalformedStorageEvent { index: 0, .. })
        ));
    }
}
