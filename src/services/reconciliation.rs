use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::MercadoPagoConfig;
use crate::dtos::WebhookNotification;
use crate::error::AppError;
use crate::services::mercadopago::MercadoPagoClient;
use crate::services::metrics;
use crate::services::repository::PaymentStore;

/// Outcome of a processed webhook, echoed back in the acknowledgement.
#[derive(Debug)]
pub struct ReconciliationSummary {
    pub payment_id: i64,
    pub status: String,
}

/// Applies provider webhook notifications to stored payments. The notification
/// body is treated as a hint only: the authoritative status is always fetched
/// from the provider before anything is written.
#[derive(Clone)]
pub struct ReconciliationService {
    payments: Arc<dyn PaymentStore>,
    provider: MercadoPagoClient,
    config: MercadoPagoConfig,
}

impl ReconciliationService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        provider: MercadoPagoClient,
        config: MercadoPagoConfig,
    ) -> Self {
        Self {
            payments,
            provider,
            config,
        }
    }

    pub async fn reconcile(
        &self,
        notification: WebhookNotification,
    ) -> Result<ReconciliationSummary, AppError> {
        let event_type = notification.event_type.as_deref().unwrap_or_default();
        if event_type != "payment" {
            tracing::debug!(event_type = event_type, "Ignoring non-payment notification");
            return Err(AppError::UnsupportedNotification(event_type.to_string()));
        }

        let payment_id: i64 = notification
            .data
            .as_ref()
            .and_then(|data| data.id.as_deref())
            .ok_or_else(|| AppError::Validation("Webhook data.id is missing".to_string()))?
            .parse()
            .map_err(|_| AppError::Validation("Webhook data.id is not numeric".to_string()))?;

        let key = payment_id.to_string();
        let record = self
            .payments
            .find(&key)
            .await
            .map_err(AppError::Persistence)?
            .ok_or_else(|| AppError::PaymentNotFound(key.clone()))?;

        let current = self
            .provider
            .get_payment(self.config.access_token.expose_secret(), &key)
            .await?;

        let status_detail = current.status_detail.unwrap_or_default();
        self.payments
            .update_status(&key, &current.status, &status_detail)
            .await
            .map_err(AppError::Persistence)?;

        metrics::record_webhook("reconciled");
        tracing::info!(
            payment_id = payment_id,
            previous_status = %record.status,
            status = %current.status,
            "Payment reconciled"
        );

        Ok(ReconciliationSummary {
            payment_id,
            status: current.status,
        })
    }
}
