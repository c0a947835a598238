//! chunk-relay worker binary.

use std::sync::Arc;

use chunk_relay::{
    Collaborators, Config, OpenAiTransformer, ProcessorSettings, ResultSink, S3ObjectStore,
    SqliteDocumentStore, SqsQueue, TaskProcessor, Worker, run_with_shutdown,
};

#[tokio::main]
async fn main() -> chunk_relay::Result<()> {
    // Before the filter is built, so RUST_LOG may come from .env
    let env_file = dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let config = Config::from_env()?;
    config.validate()?;

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let queue = Arc::new(SqsQueue::new(
        aws_sdk_sqs::Client::new(&sdk_config),
        &config.queue,
    ));
    let objects = Arc::new(S3ObjectStore::new(
        aws_sdk_s3::Client::new(&sdk_config),
        &config.object_store,
    ));
    let documents = Arc::new(SqliteDocumentStore::open(&config.document_store).await?);
    let transformer = Arc::new(OpenAiTransformer::new(&config.transform)?);

    tracing::info!(
        input_queue = %config.queue.input_queue_url,
        output_queue = %config.queue.output_queue_url,
        bucket = %config.object_store.bucket,
        collection = %config.document_store.collection_name,
        model = %config.transform.model,
        max_chunk_len = config.processing.max_chunk_len,
        "Starting chunk-relay"
    );

    let processor = TaskProcessor::new(
        ProcessorSettings::from(&config),
        Collaborators {
            transformer,
            lease: queue.clone(),
            sink: ResultSink::new(documents.clone(), objects, queue.clone()),
        },
    );

    let worker = Worker::new(queue, processor, &config);
    let consumer = worker.start_consumer();

    run_with_shutdown(worker).await?;
    if let Err(e) = consumer.await {
        tracing::warn!(error = %e, "Queue consumer task ended abnormally");
    }
    documents.close().await;

    Ok(())
}
