//! Alert dispatch with per-category cooldown
//!
//! `AlertDispatcher` runs on the log-reading path. It enforces the cooldown and
//! hands messages to a bounded queue without waiting on the network.
//! `AlertSender` drains that queue on its own task and makes exactly one
//! delivery attempt per message through an `AlertSink` (normally the Slack
//! webhook). Failed deliveries are logged and never retried.

use crate::monitoring::analyzer::AlertCategory;
use crate::utils::AppError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Slack incoming-webhook payload
#[derive(Debug, Serialize)]
pub struct SlackMessage {
    pub text: String,
}

/// Destination for alert messages
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Make a single delivery attempt
    async fn deliver(&self, message: &str) -> Result<(), AppError>;
}

/// Slack-compatible webhook sink
#[derive(Debug, Clone)]
pub struct WebhookSink {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl WebhookSink {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn deliver(&self, message: &str) -> Result<(), AppError> {
        let payload = SlackMessage {
            text: message.to_string(),
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::delivery_failed(format!("webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::delivery_failed(format!(
                "webhook returned {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Message waiting for delivery
#[derive(Debug, Clone)]
pub struct QueuedAlert {
    pub category: AlertCategory,
    pub message: String,
}

/// What `dispatch` did with an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the sender for delivery
    Queued,
    /// No webhook configured; written to the local log only
    LoggedOnly,
    /// Same category alerted within the cooldown
    Suppressed,
    /// Delivery queue full or closed; the cooldown still applies
    Dropped,
}

/// Cooldown gate in front of the delivery queue
#[derive(Debug)]
pub struct AlertDispatcher {
    queue: Option<mpsc::Sender<QueuedAlert>>,
    cooldown: Duration,
    /// Last attempted send per category
    last_sent: HashMap<AlertCategory, Instant>,
}

impl AlertDispatcher {
    /// Dispatcher without a delivery channel; alerts go to the local log
    pub fn local_only(cooldown: Duration) -> Self {
        Self {
            queue: None,
            cooldown,
            last_sent: HashMap::new(),
        }
    }

    /// Dispatcher feeding `sink` through a queue of `capacity` messages
    ///
    /// The returned sender must be run (usually on its own task) for messages
    /// to be delivered.
    pub fn with_sink<S: AlertSink>(
        sink: S,
        cooldown: Duration,
        capacity: usize,
    ) -> (Self, AlertSender<S>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dispatcher = Self {
            queue: Some(tx),
            cooldown,
            last_sent: HashMap::new(),
        };
        let sender = AlertSender {
            sink: Arc::new(sink),
            rx,
        };
        (dispatcher, sender)
    }

    /// Whether alerts leave the process
    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    pub fn last_sent(&self, category: AlertCategory) -> Option<Instant> {
        self.last_sent.get(&category).copied()
    }

    /// Rate-limit and enqueue an alert
    ///
    /// Without a webhook every alert is written to the local log; the
    /// timestamp is still recorded. With a webhook the cooldown timestamp is
    /// recorded before delivery is attempted, so a slow or failing webhook
    /// cannot cause a burst of repeats.
    pub fn dispatch(&mut self, category: AlertCategory, message: impl Into<String>) -> DispatchOutcome {
        let message = message.into();
        let now = Instant::now();

        let Some(queue) = &self.queue else {
            self.last_sent.insert(category, now);
            warn!(
                category = %category,
                message = %message,
                "No webhook configured, alert logged only"
            );
            return DispatchOutcome::LoggedOnly;
        };

        if let Some(last) = self.last_sent.get(&category) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.cooldown {
                info!(
                    category = %category,
                    remaining_secs = (self.cooldown - elapsed).as_secs(),
                    message = %message,
                    "Alert cooldown active, skipping"
                );
                return DispatchOutcome::Suppressed;
            }
        }

        self.last_sent.insert(category, now);

        match queue.try_send(QueuedAlert { category, message }) {
            Ok(()) => {
                debug!(category = %category, "Alert queued for delivery");
                DispatchOutcome::Queued
            }
            Err(TrySendError::Full(alert)) => {
                error!(
                    category = %category,
                    message = %alert.message,
                    "Alert queue full, dropping alert"
                );
                DispatchOutcome::Dropped
            }
            Err(TrySendError::Closed(alert)) => {
                error!(
                    category = %category,
                    message = %alert.message,
                    "Alert sender stopped, dropping alert"
                );
                DispatchOutcome::Dropped
            }
        }
    }

    /// Stop accepting alerts; the sender finishes what is queued and exits
    pub fn close(&mut self) {
        self.queue = None;
    }
}

/// Delivery counts reported when the sender exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub delivered: usize,
    pub failed: usize,
}

/// Background task draining the delivery queue
pub struct AlertSender<S: AlertSink> {
    sink: Arc<S>,
    rx: mpsc::Receiver<QueuedAlert>,
}

impl<S: AlertSink> AlertSender<S> {
    /// Deliver queued alerts until every dispatcher handle is gone
    pub async fn run(mut self) -> SenderStats {
        info!("Starting alert sender");
        let mut stats = SenderStats::default();

        while let Some(alert) = self.rx.recv().await {
            if self.deliver(&alert).await {
                stats.delivered += 1;
            } else {
                stats.failed += 1;
            }
        }

        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Alert sender stopped"
        );
        stats
    }

    #[instrument(skip(self, alert), fields(category = %alert.category))]
    async fn deliver(&self, alert: &QueuedAlert) -> bool {
        match self.sink.deliver(&alert.message).await {
            Ok(()) => {
                info!(message = %alert.message, "Alert sent");
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    error_code = e.error_code(),
                    message = %alert.message,
                    "Alert delivery failed, not retrying"
                );
                false
            }
        }
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }
}
