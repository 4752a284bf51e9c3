use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::info;

use trailhead_core::config::{AppConfig, ConfigError, LoadOptions};
use trailhead_core::PipelineError;
use trailhead_rag::{OpenAiChat, OpenAiEmbedder, PineconeIndex, RetrievalChain};
use trailhead_slack::api::SlackWebApi;
use trailhead_slack::events::{DmMessageHandler, EventDispatcher};
use trailhead_slack::socket::{ReconnectPolicy, SocketModeRunner};
use trailhead_slack::transport::WebSocketTransport;

use crate::service::ChainAnswerService;

pub struct Application {
    pub config: AppConfig,
    pub index_host: String,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("vector index bootstrap failed: {0}")]
    IndexConnect(#[source] PipelineError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds every long-lived client exactly once and wires them together.
///
/// The Pinecone control-plane describe runs here, so a misconfigured index
/// is a startup error rather than a failure on the first question.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let openai_client = Client::builder()
        .timeout(Duration::from_secs(config.openai.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let pinecone_client = Client::builder()
        .timeout(Duration::from_secs(config.pinecone.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let slack_client = Client::new();

    let index = PineconeIndex::connect(pinecone_client, &config.pinecone)
        .await
        .map_err(BootstrapError::IndexConnect)?;
    let index_host = index.host().to_owned();
    info!(
        event_name = "system.bootstrap.index_connected",
        correlation_id = "bootstrap",
        index_host = %index_host,
        "vector index host resolved"
    );

    let embedder = OpenAiEmbedder::new(
        openai_client.clone(),
        config.openai.api_key.clone(),
        config.openai.embedding_model.clone(),
    );
    let completions = OpenAiChat::new(
        openai_client,
        config.openai.api_key.clone(),
        config.openai.model.clone(),
        config.openai.max_tokens,
    );
    let chain = Arc::new(RetrievalChain::new(
        Arc::new(embedder),
        Arc::new(index),
        Arc::new(completions),
        config.retrieval.top_k,
    ));

    let chat_api = SlackWebApi::new(slack_client.clone(), config.slack.bot_token.clone());
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(DmMessageHandler::new(
        Arc::new(chat_api),
        ChainAnswerService::new(chain),
        config.retrieval.history_window,
    ));

    let transport = WebSocketTransport::new(slack_client, config.slack.app_token.clone());
    let slack_runner = SocketModeRunner::new(
        Arc::new(transport),
        Arc::new(dispatcher),
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "application bootstrap complete"
    );

    Ok(Application { config, index_host, slack_runner })
}
