use std::time::Duration;

use hemicycle_core::error::AppError;
use hemicycle_core::taxonomy::UnclassifiedLabel;
use hemicycle_core::traits::Notifier;
use reqwest::Client;
use serde::Serialize;

/// Body posted to the webhook for each signal.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WebhookEvent<'a> {
    EntityUpdated { official_id: &'a str },
    BatchCompleted { batch: &'a str, updated: usize },
    UnclassifiedLabel { label: &'a UnclassifiedLabel },
}

/// Notifier posting each signal as JSON to a webhook.
///
/// Posts run on spawned tasks so the pipeline never waits on the consumer.
/// Failures are logged and dropped.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    fn post(&self, event: WebhookEvent<'_>) {
        let body = match serde_json::to_value(&event) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize webhook event");
                return;
            }
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, webhook event dropped");
            return;
        };

        let request = self.client.post(&self.url).json(&body);
        let url = self.url.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(%url, "Webhook delivered");
                }
                Ok(response) => {
                    tracing::warn!(%url, status = response.status().as_u16(), "Webhook rejected");
                }
                Err(e) => tracing::warn!(%url, error = %e, "Webhook failed"),
            }
        });
    }
}

impl Notifier for WebhookNotifier {
    fn entity_updated(&self, official_id: &str) {
        self.post(WebhookEvent::EntityUpdated { official_id });
    }

    fn batch_completed(&self, batch: &str, updated: usize) {
        self.post(WebhookEvent::BatchCompleted { batch, updated });
    }

    fn unclassified_label(&self, label: &UnclassifiedLabel) {
        self.post(WebhookEvent::UnclassifiedLabel { label });
    }
}
