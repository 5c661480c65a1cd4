use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::errors::AppError;
use crate::models::{Contractor, LeadSummary};

/// Result of one notification delivery attempt. Failure is reported to the
/// caller for bookkeeping, never raised as a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The notification service accepted the message.
    Delivered,
    /// No notification service is configured; the delivery was logged only.
    Simulated,
    /// The service rejected the message or the request failed.
    Failed(String),
}

/// Client for the contractor notification service.
///
/// Constructed only when `NOTIFY_BASE_URL`/`NOTIFY_TOKEN` are present;
/// otherwise the application state carries `None` and deliveries degrade to
/// simulated outcomes.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl Notifier {
    pub fn new(base_url: &str, token: String) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AppError::InternalError(format!("Invalid notification base URL: {}", e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create notifier client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Inform the collaborator that `contractor` received `lead`. Routed
    /// through the optional client so missing configuration degrades to a
    /// logged no-op instead of an error.
    pub async fn notify_assignment(
        notifier: &Option<Notifier>,
        contractor: &Contractor,
        lead: &LeadSummary,
    ) -> DeliveryOutcome {
        match notifier {
            Some(n) => n.send(contractor, lead).await,
            None => {
                tracing::info!(
                    "Simulated notification: contractor {} <{}> would receive lead {} (zip {})",
                    contractor.name,
                    contractor.email,
                    lead.lead_id,
                    lead.zip_code
                );
                DeliveryOutcome::Simulated
            }
        }
    }

    async fn send(&self, contractor: &Contractor, lead: &LeadSummary) -> DeliveryOutcome {
        let url = match self.base_url.join("notifications/lead-assigned") {
            Ok(url) => url,
            Err(e) => return DeliveryOutcome::Failed(format!("Failed to build URL: {}", e)),
        };

        let body = json!({
            "contractor_id": contractor.id,
            "contractor_email": contractor.email,
            "lead": lead,
        });

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(
                    "Notification delivered to contractor {} for lead {}",
                    contractor.id,
                    lead.lead_id
                );
                DeliveryOutcome::Delivered
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                DeliveryOutcome::Failed(format!(
                    "Notification service returned {}: {}",
                    status, text
                ))
            }
            Err(e) => DeliveryOutcome::Failed(format!("Notification request failed: {}", e)),
        }
    }
}
