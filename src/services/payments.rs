use std::sync::Arc;

use validator::Validate;

use crate::dtos::{PaymentRequest, PaymentResponse};
use crate::error::AppError;
use crate::models::{PaymentModality, PaymentRecord};
use crate::services::metrics;
use crate::services::oauth::OauthService;
use crate::services::repository::PaymentStore;
use crate::services::strategy::PaymentStrategies;

/// Front door for payment creation. Validates the request, resolves the
/// tenant credential when the payment is split, dispatches to the matching
/// strategy and records the result.
#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    oauth: OauthService,
    strategies: PaymentStrategies,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        oauth: OauthService,
        strategies: PaymentStrategies,
    ) -> Self {
        Self {
            payments,
            oauth,
            strategies,
        }
    }

    pub async fn generate_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentResponse, AppError> {
        request.validate()?;

        let modality = PaymentModality::parse(&request.payment_type_id)?;
        let kind = modality.strategy();

        let tenant = if request.split_payment {
            let company_id = request.company_id.ok_or_else(|| {
                AppError::Validation("companyId is required for split payments".to_string())
            })?;
            Some(self.oauth.ensure_fresh(company_id).await?)
        } else {
            None
        };

        tracing::info!(
            modality = modality.as_str(),
            split = request.split_payment,
            amount = request.total_amount,
            "Generating payment"
        );

        let record = self
            .strategies
            .execute(kind, &request, tenant.as_ref())
            .await?;

        if let Err(e) = self.payments.insert(record.clone()).await {
            // The provider already accepted this payment. Losing the local
            // record means the webhook reconciler cannot match it later, so
            // the failure is surfaced loudly instead of swallowed.
            metrics::record_orphaned_payment();
            tracing::error!(
                provider_payment_id = %record.provider_payment_id,
                status = %record.status,
                error = %e,
                "Payment created at provider but local record write failed"
            );
            return Err(AppError::Persistence(e));
        }

        metrics::record_payment(modality.as_str(), "created");
        tracing::info!(
            provider_payment_id = %record.provider_payment_id,
            status = %record.status,
            "Payment recorded"
        );

        Ok(PaymentResponse {
            id: record.provider_payment_id,
            description: record.description,
            status: record.status,
            status_detail: record.status_detail,
            payment_method_id: record.method,
            payment_type_id: record.modality,
            transaction_amount: record.total_amount,
        })
    }

    pub async fn find_payment(
        &self,
        provider_payment_id: &str,
    ) -> Result<Option<PaymentRecord>, AppError> {
        self.payments
            .find(provider_payment_id)
            .await
            .map_err(AppError::Persistence)
    }
}
