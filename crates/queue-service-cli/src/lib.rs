//! # Queue Service CLI
//!
//! Command-line interface for publishing to and consuming from SQS queues and
//! SNS topics with queue-service.
//!
//! This module provides CLI commands for:
//! - Sending a payload to the configured queue or topic
//! - Consuming the configured queue, printing each payload as a JSON line
//! - Showing the resolved configuration
//! - Generating shell completions

use async_trait::async_trait;
use clap::{CommandFactory, Parser, Subcommand};
use queue_service::{
    AwsCredentials, Codec, ConfigurationError, DistributeError, Distributor, HandlerError, JsonCodec,
    MessageEnvelope, MessageGroupId, MessageHandler, MessageId, MessagePublisher,
    MessageReceiver, NotificationUnwrapper, QueueConfiguration, QueueRef, QueueTransport,
    ReceiverConfig, SnsPublisher, SqsTransport, TextCodec, TopicConfiguration, TransportError,
    ValidationError,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue Service CLI - typed messaging over SQS and SNS
#[derive(Parser)]
#[command(name = "queue-service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send and consume messages on SQS queues and SNS topics")]
#[command(
    long_about = "Publishes payloads to a queue or topic and consumes a queue, deleting handled messages and scheduling failed ones for redelivery"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUEUE_SERVICE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Send one payload
    Send {
        /// Payload to send; parsed as JSON unless --raw is given
        payload: String,

        /// Publish to the configured topic instead of the queue
        #[arg(short, long)]
        topic: bool,

        /// Message group for FIFO destinations
        #[arg(short, long)]
        group_id: Option<String>,

        /// Delivery delay in seconds (standard queues only)
        #[arg(short, long)]
        delay: Option<u32>,

        /// Send the payload text unchanged
        #[arg(long)]
        raw: bool,
    },

    /// Consume the configured queue
    Consume {
        /// Process a single batch and exit
        #[arg(long)]
        once: bool,

        /// Unwrap topic notifications before decoding
        #[arg(short, long)]
        notifications: bool,

        /// Check SNS signatures of unwrapped notifications
        #[arg(long, requires = "notifications")]
        verify_signatures: bool,

        /// Treat message bodies as text instead of JSON
        #[arg(long)]
        raw: bool,

        /// Pause after an empty or failed poll, in milliseconds
        #[arg(long, default_value = "1000")]
        idle_delay_ms: u64,
    },

    /// Validate and show configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Send failed: {0}")]
    Distribute(#[from] DistributeError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Transport(_) => 2,
            Self::Distribute(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
            Self::CommandFailed { .. } => 6,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ConfigurationError),

    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Failed to render configuration: {message}")]
    Render { message: String },
}

// ============================================================================
// Configuration Types
// ============================================================================

/// CLI configuration structure
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Queue used by `send` and `consume`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfiguration>,

    /// Topic used by `send --topic`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<TopicConfiguration>,

    /// Retry and concurrency settings for `consume`
    pub receiver: ReceiverConfig,
}

impl CliConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(queue) = &self.queue {
            queue.validate()?;
        }
        if let Some(topic) = &self.topic {
            topic.validate()?;
        }
        self.receiver.validate()?;
        Ok(())
    }

    pub fn queue(&self) -> Result<&QueueConfiguration, ConfigError> {
        self.queue.as_ref().ok_or_else(|| ConfigError::MissingRequired {
            key: "queue.queue_name".to_string(),
        })
    }

    pub fn topic(&self) -> Result<&TopicConfiguration, ConfigError> {
        self.topic.as_ref().ok_or_else(|| ConfigError::MissingRequired {
            key: "topic.topic_arn".to_string(),
        })
    }

    /// Copy with secret keys masked, for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        redact(copy.queue.as_mut().and_then(|q| q.credentials.as_mut()));
        redact(copy.topic.as_mut().and_then(|t| t.credentials.as_mut()));
        copy
    }
}

fn redact(credentials: Option<&mut AwsCredentials>) {
    if let Some(credentials) = credentials {
        credentials.secret_access_key = REDACTED.to_string();
        if credentials.session_token.is_some() {
            credentials.session_token = Some(REDACTED.to_string());
        }
    }
}

const REDACTED: &str = "***";

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    // Initialize logging
    initialize_logging(&cli)?;

    if let Commands::Completions { shell } = &cli.command {
        return execute_completions_command(*shell);
    }

    // Load configuration
    let config = load_configuration(cli.config.as_deref())?;

    // Execute command
    match cli.command {
        Commands::Send {
            payload,
            topic,
            group_id,
            delay,
            raw,
        } => execute_send_command(&config, payload, topic, group_id, delay, raw).await,
        Commands::Consume {
            once,
            notifications,
            verify_signatures,
            raw,
            idle_delay_ms,
        } => {
            let options = ConsumeOptions {
                once,
                notifications,
                verify_signatures,
                idle_delay: Duration::from_millis(idle_delay_ms),
            };
            execute_consume_command(&config, options, raw).await
        }
        Commands::Config { show, format } => execute_config_command(&config, show, format),
        Commands::Completions { .. } => Ok(()),
    }
}

// ============================================================================
// Logging and Configuration
// ============================================================================

/// Default filter when `RUST_LOG` is not set
pub fn default_log_filter(level: &str) -> String {
    format!("queue_service={level},queue_service_cli={level}", level = level)
}

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr; stdout carries command output only.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_log_filter(&cli.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    let result = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("Failed to initialize logging: {}", e),
    })
}

/// Load configuration from files and environment
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/queue-service/config.*`  - system-wide defaults
///  2. `./config/queue-service.*`     - deployment-local override
///  3. `config_path`                  - operator-specified file, required
///  4. Environment variables prefixed `QS__` with `__` as separator,
///     e.g. `QS__QUEUE__QUEUE_NAME=orders.fifo`
pub fn load_configuration(config_path: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("/etc/queue-service/config").required(false))
        .add_source(config::File::with_name("config/queue-service").required(false));

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let settings = builder
        .add_source(config::Environment::with_prefix("QS").separator("__"))
        .build()?;

    let cli_config: CliConfig = settings.try_deserialize()?;
    cli_config.validate()?;

    Ok(cli_config)
}

/// Render configuration in the requested format
pub fn render_configuration(config: &CliConfig, format: &ConfigFormat) -> Result<String, ConfigError> {
    let render_error = |e: &dyn std::fmt::Display| ConfigError::Render {
        message: e.to_string(),
    };

    match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| render_error(&e)),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| render_error(&e)),
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| render_error(&e)),
    }
}

// ============================================================================
// Send
// ============================================================================

/// Parse the `--group-id` argument
pub fn parse_group_id(group_id: Option<String>) -> Result<Option<MessageGroupId>, CliError> {
    group_id
        .map(|g| {
            MessageGroupId::from_str(&g).map_err(|e: ValidationError| CliError::InvalidArgument {
                arg: "group-id".to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// Send one payload through a publisher
///
/// JSON payloads are validated before sending; raw payloads go out unchanged.
pub async fn send_payload<P>(
    publisher: P,
    payload: String,
    group_id: Option<MessageGroupId>,
    delay_seconds: Option<u32>,
    raw: bool,
) -> Result<MessageId, CliError>
where
    P: MessagePublisher,
{
    let message_id = if raw {
        Distributor::new(TextCodec, publisher)
            .distribute(payload, group_id, delay_seconds)
            .await?
    } else {
        let value: serde_json::Value =
            serde_json::from_str(&payload).map_err(|e| CliError::InvalidArgument {
                arg: "payload".to_string(),
                message: format!("not valid JSON ({}); use --raw to send text", e),
            })?;
        Distributor::new(JsonCodec::<serde_json::Value>::new(), publisher)
            .distribute(value, group_id, delay_seconds)
            .await?
    };

    Ok(message_id)
}

async fn execute_send_command(
    config: &CliConfig,
    payload: String,
    topic: bool,
    group_id: Option<String>,
    delay: Option<u32>,
    raw: bool,
) -> Result<(), CliError> {
    let group_id = parse_group_id(group_id)?;

    let message_id = if topic {
        let publisher = SnsPublisher::new(config.topic()?.clone())?;
        info!(topic = %publisher.destination(), "Publishing message to topic");
        send_payload(publisher, payload, group_id, delay, raw).await?
    } else {
        let transport = SqsTransport::new(config.queue()?.clone())?;
        info!(queue = %transport.destination(), "Sending message to queue");
        send_payload(transport, payload, group_id, delay, raw).await?
    };

    println!("{}", message_id);
    Ok(())
}

// ============================================================================
// Consume
// ============================================================================

/// Handler that writes each payload to stdout as one JSON line
#[derive(Debug, Clone, Default)]
pub struct PrintingHandler;

impl PrintingHandler {
    /// JSON line written for one message
    pub fn render<F: Serialize>(
        &self,
        queue: &QueueRef,
        envelope: &MessageEnvelope<F>,
    ) -> Result<String, HandlerError> {
        let line = serde_json::json!({
            "queue": queue.to_string(),
            "message_id": envelope.message_id.as_ref().map(|id| id.to_string()),
            "message_group_id": envelope.message_group_id.as_ref().map(|g| g.to_string()),
            "payload": serde_json::to_value(&envelope.content)
                .map_err(|e| HandlerError::Other(anyhow::anyhow!(e)))?,
        });
        Ok(line.to_string())
    }
}

#[async_trait]
impl<F> MessageHandler<F> for PrintingHandler
where
    F: Serialize + Send + Sync,
{
    async fn on_message(
        &self,
        queue: &QueueRef,
        envelope: &MessageEnvelope<F>,
    ) -> Result<(), HandlerError> {
        println!("{}", self.render(queue, envelope)?);
        Ok(())
    }
}

/// Polling behaviour for `consume`
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub once: bool,
    pub notifications: bool,
    pub verify_signatures: bool,
    pub idle_delay: Duration,
}

/// Totals over all batches of one `consume` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    pub batches: usize,
    pub received: usize,
    pub deleted: usize,
    pub retried: usize,
}

/// Poll `transport` until `stop` is set, or for one batch with `once`
///
/// A failed poll ends a `once` run with the error; otherwise it is logged and
/// polling continues after the idle delay.
pub async fn consume<F, C, H, T>(
    receiver: &MessageReceiver<F, C, H>,
    transport: &T,
    options: &ConsumeOptions,
    stop: &AtomicBool,
) -> Result<ConsumeSummary, CliError>
where
    F: Send + Sync,
    C: Codec<F>,
    H: MessageHandler<F>,
    T: QueueTransport + ?Sized,
{
    let mut summary = ConsumeSummary::default();

    while !stop.load(Ordering::SeqCst) {
        match receiver.receive_messages(transport).await {
            Ok(outcome) => {
                summary.batches += 1;
                summary.received += outcome.received();
                summary.deleted += outcome.deleted();
                summary.retried += outcome.retried();

                if options.once {
                    break;
                }
                if outcome.is_empty() {
                    tokio::time::sleep(options.idle_delay).await;
                }
            }
            Err(e) if options.once => return Err(e.into()),
            Err(e) => {
                warn!(queue = %transport.queue(), error = %e, "Receive failed, retrying after idle delay");
                tokio::time::sleep(options.idle_delay).await;
            }
        }
    }

    debug!(?summary, "Consumer stopped");
    Ok(summary)
}

async fn execute_consume_command(
    config: &CliConfig,
    options: ConsumeOptions,
    raw: bool,
) -> Result<(), CliError> {
    let transport = SqsTransport::new(config.queue()?.clone())?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping after the current batch");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(queue = %transport.queue(), once = options.once, "Consuming queue");

    let summary = if raw {
        let receiver = build_receiver(TextCodec, config, &options)?;
        consume(&receiver, &transport, &options, &stop).await?
    } else {
        let receiver = build_receiver(JsonCodec::<serde_json::Value>::new(), config, &options)?;
        consume(&receiver, &transport, &options, &stop).await?
    };

    info!(
        batches = summary.batches,
        received = summary.received,
        deleted = summary.deleted,
        retried = summary.retried,
        "Consumer finished"
    );
    Ok(())
}

/// Receiver with the configured retry settings and optional unwrapping
pub fn build_receiver<F, C>(
    codec: C,
    config: &CliConfig,
    options: &ConsumeOptions,
) -> Result<MessageReceiver<F, C, PrintingHandler>, CliError>
where
    F: Serialize + Send + Sync,
    C: Codec<F>,
{
    let receiver = MessageReceiver::new(codec, PrintingHandler).with_config(config.receiver.clone());
    if !options.notifications {
        return Ok(receiver);
    }

    let mut unwrapper = match &config.topic {
        Some(topic) => NotificationUnwrapper::new().with_expected_topic(topic.topic_arn.clone()),
        None => NotificationUnwrapper::new(),
    };
    if options.verify_signatures {
        unwrapper = unwrapper
            .with_signature_verification()
            .map_err(|e| CliError::CommandFailed {
                message: format!("Failed to set up signature verification: {}", e),
            })?;
    }
    Ok(receiver.with_preprocessor(unwrapper))
}

// ============================================================================
// Config and Completions
// ============================================================================

fn execute_config_command(config: &CliConfig, show: bool, format: ConfigFormat) -> Result<(), CliError> {
    info!("Configuration is valid");

    if show {
        println!("{}", render_configuration(&config.redacted(), &format)?);
    }
    Ok(())
}

fn execute_completions_command(shell: clap_complete::Shell) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}
