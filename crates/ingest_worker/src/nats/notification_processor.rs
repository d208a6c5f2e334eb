use crate::domain::{BatchResult, IngestionService, ItemOutcome, NotificationItem};
use async_nats::jetstream::Message;
use common::nats::{BatchProcessor, ProcessingResult};
use std::sync::Arc;
use tracing::debug;

/// Create a BatchProcessor that runs each fetched batch through the ingestion service
pub fn create_notification_processor(service: Arc<IngestionService>) -> BatchProcessor {
    Box::new(move |messages: &[Message]| {
        let service = Arc::clone(&service);

        // Copy out of the borrowed slice before moving into the future
        let items = notification_items(messages);

        Box::pin(async move { Ok(process_notifications(&service, items).await) })
    })
}

/// One item per message; the id combines subject and batch position
pub fn notification_items(messages: &[Message]) -> Vec<NotificationItem> {
    messages
        .iter()
        .enumerate()
        .map(|(index, msg)| NotificationItem {
            message_id: format!("{}#{}", msg.subject, index),
            body: msg.payload.clone(),
        })
        .collect()
}

pub async fn process_notifications(
    service: &IngestionService,
    items: Vec<NotificationItem>,
) -> ProcessingResult {
    let result = service.handle_batch(items).await;
    to_processing_result(&result)
}

/// Ack succeeded items and nak failed ones so only those are redelivered
pub fn to_processing_result(result: &BatchResult) -> ProcessingResult {
    let mut ack = Vec::new();
    let mut nak = Vec::new();

    for (index, outcome) in result.outcomes.iter().enumerate() {
        match outcome {
            ItemOutcome::Succeeded => ack.push(index),
            ItemOutcome::Failed { reason } => nak.push((index, Some(reason.clone()))),
        }
    }

    debug!(ack = ack.len(), nak = nak.len(), "mapped batch result");
    ProcessingResult::new(ack, nak)
}
