use crate::domain::{IngestionService, IngestionServiceConfig, TopicRouter};
use crate::nats::create_notification_processor;
use common::domain::{ObjectStore, RecordSink};
use common::nats::{ConsumerSettings, NatsClient, NatsConsumer};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct IngestWorkerConfig {
    pub consumer: ConsumerSettings,
    pub base_topic_name: String,
    pub service: IngestionServiceConfig,
}

/// Long-running process consuming storage notifications from JetStream
pub struct IngestWorker {
    consumer: NatsConsumer,
}

impl IngestWorker {
    pub async fn new(
        nats_client: Arc<NatsClient>,
        object_store: Arc<dyn ObjectStore>,
        sink: Arc<dyn RecordSink>,
        config: IngestWorkerConfig,
    ) -> anyhow::Result<Self> {
        info!(
            stream = %config.consumer.stream_name,
            base_topic = %config.base_topic_name,
            "Initializing ingest worker"
        );

        nats_client.ensure_stream(&config.consumer.stream_name).await?;

        let service = Arc::new(IngestionService::new(
            object_store,
            sink,
            TopicRouter::new(config.base_topic_name),
            config.service,
        ));
        let processor = create_notification_processor(service);

        let consumer = NatsConsumer::new(
            nats_client.create_consumer_client(),
            config.consumer,
            processor,
        )
        .await?;

        info!("Ingest worker initialized");
        Ok(Self { consumer })
    }

    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send,
    > {
        let consumer = self.consumer;
        Box::new(move |ctx| Box::pin(async move { consumer.run(ctx).await }))
    }
}
