//! Telegram Bot API delivery.
//!
//! ```text
//! monitor / service ──notify()──► TelegramNotifier ──try_send──► mpsc
//!                                                               │
//!                                        TelegramDispatcher ◄───┘
//!                                          render → sendMessage
//! ```
//!
//! The notifier never waits on the network. A full queue drops the event.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sentinel_core::ChannelName;
use sentinel_telemetry::Metrics;

use crate::error::{NotifyError, NotifyResult};
use crate::event::LifecycleEvent;
use crate::notifier::Notifier;
use crate::render::{render, RenderedMessage};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
const QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    /// Empty disables delivery.
    pub bot_token: String,
    /// Channel name → chat id.
    pub chats: HashMap<ChannelName, String>,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chats: HashMap<ChannelName, String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chats,
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token
        )
    }
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    tx: mpsc::Sender<LifecycleEvent>,
}

impl Notifier for TelegramNotifier {
    fn notify(&self, event: LifecycleEvent) {
        Metrics::lifecycle_event(event.kind());
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(event = event.kind(), "Telegram queue full, dropping notification");
                Metrics::notify_failure("queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(event = event.kind(), "Telegram dispatcher stopped, dropping notification");
                Metrics::notify_failure("closed");
            }
        }
    }
}

/// Consumer half: drains the queue and posts each message.
pub struct TelegramDispatcher {
    config: TelegramConfig,
    client: Client,
    rx: mpsc::Receiver<LifecycleEvent>,
}

impl TelegramDispatcher {
    pub fn new(config: TelegramConfig, rx: mpsc::Receiver<LifecycleEvent>) -> NotifyResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client, rx })
    }

    /// Run until every [`TelegramNotifier`] has been dropped.
    pub async fn run(mut self) {
        info!(channels = self.config.chats.len(), "Telegram dispatcher started");
        while let Some(event) = self.rx.recv().await {
            let kind = event.kind();
            match self.deliver(&event).await {
                Ok(()) => debug!(event = kind, channel = %event.channel(), "Notification sent"),
                Err(NotifyError::NotConfigured) => {
                    debug!(event = kind, "Telegram not configured, notification dropped");
                }
                Err(NotifyError::UnknownChannel(channel)) => {
                    debug!(event = kind, %channel, "No chat for channel, notification dropped");
                }
                Err(e) => {
                    warn!(event = kind, error = %e, "Telegram send failed");
                    Metrics::notify_failure(failure_label(&e));
                }
            }
        }
        info!("Telegram dispatcher stopped");
    }

    async fn deliver(&self, event: &LifecycleEvent) -> NotifyResult<()> {
        if self.config.bot_token.is_empty() {
            return Err(NotifyError::NotConfigured);
        }
        let chat_id = self
            .config
            .chats
            .get(event.channel())
            .ok_or_else(|| NotifyError::UnknownChannel(event.channel().to_string()))?;

        let payload = send_message_payload(chat_id, &render(event));
        let response = self
            .client
            .post(self.config.send_url())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

fn failure_label(e: &NotifyError) -> &'static str {
    match e {
        NotifyError::Http(e) if e.is_timeout() => "timeout",
        NotifyError::Http(_) => "http",
        NotifyError::Status { .. } => "status",
        _ => "other",
    }
}

/// Body of a `sendMessage` call.
pub fn send_message_payload(chat_id: &str, message: &RenderedMessage) -> Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": message.text(),
        "parse_mode": "Markdown",
    });
    if let Some((label, data)) = &message.button {
        payload["reply_markup"] = json!({
            "inline_keyboard": [[{ "text": label, "callback_data": data }]]
        });
    }
    payload
}

/// Create the notifier and spawn its dispatcher on the current runtime.
pub fn spawn_telegram(config: TelegramConfig) -> NotifyResult<(TelegramNotifier, JoinHandle<()>)> {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let dispatcher = TelegramDispatcher::new(config, rx)?;
    let handle = tokio::spawn(dispatcher.run());
    Ok((TelegramNotifier { tx }, handle))
}
