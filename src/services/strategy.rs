//! Payment processing strategies.
//!
//! Two execution paths: account-balance payments always go through a
//! Checkout Pro preference; card payments go through a preference when
//! brokered for a tenant (split) and through the Orders API when charged
//! directly with the platform credential.
//!
//! Split payments withhold a 10% marketplace commission, rounded to cents.

use std::collections::HashMap;

use mongodb::bson::DateTime;
use secrecy::ExposeSecret;

use crate::config::MercadoPagoConfig;
use crate::dtos::PaymentRequest;
use crate::error::{AppError, ProviderError};
use crate::models::{PaymentRecord, StrategyKind, TenantCredential};
use crate::services::mercadopago::{
    Identification, MercadoPagoClient, OrderItem, OrderPayer, OrderPaymentMethod,
    OrderPaymentRequest, OrderRequest, OrderResponse, OrderTransactions, PreferenceBackUrls,
    PreferenceItem, PreferencePayer, PreferenceRequest, PreferenceResponse,
};
use crate::utils::generate_reference;

pub const COMMISSION_RATE: f64 = 0.10;

/// Marketplace commission for a split payment, rounded to cents.
pub fn commission_for(total: f64) -> f64 {
    round2(total * COMMISSION_RATE)
}

/// Commission and net amount for a split payment.
pub fn split_amounts(total: f64) -> (f64, f64) {
    let commission = commission_for(total);
    (commission, round2(total - commission))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct PaymentStrategies {
    provider: MercadoPagoClient,
    config: MercadoPagoConfig,
}

impl PaymentStrategies {
    pub fn new(provider: MercadoPagoClient, config: MercadoPagoConfig) -> Self {
        Self { provider, config }
    }

    /// Run the strategy selected by the dispatcher. `tenant` is present
    /// exactly when the request is a split payment; its credential is
    /// expected to be fresh.
    pub async fn execute(
        &self,
        kind: StrategyKind,
        request: &PaymentRequest,
        tenant: Option<&TenantCredential>,
    ) -> Result<PaymentRecord, AppError> {
        match kind {
            StrategyKind::AccountBalance => self.account_balance(request, tenant).await,
            StrategyKind::Card => self.card(request, tenant).await,
        }
    }

    async fn account_balance(
        &self,
        request: &PaymentRequest,
        tenant: Option<&TenantCredential>,
    ) -> Result<PaymentRecord, AppError> {
        if !request.payment_method_id.eq_ignore_ascii_case("account_money")
            || !request.payment_type_id.eq_ignore_ascii_case("account_money")
        {
            return Err(AppError::Validation(
                "Account balance payments require the account_money method".to_string(),
            ));
        }
        if request.currency_id.is_empty() {
            return Err(AppError::Validation(
                "Currency is required for account balance payments".to_string(),
            ));
        }

        self.checkout_preference(request, tenant).await
    }

    async fn card(
        &self,
        request: &PaymentRequest,
        tenant: Option<&TenantCredential>,
    ) -> Result<PaymentRecord, AppError> {
        let token = request
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("Card token is required".to_string()))?;
        let installments = request
            .installments
            .filter(|i| *i >= 1)
            .ok_or_else(|| AppError::Validation("Installments are required".to_string()))?;
        request
            .issuer_id
            .as_deref()
            .filter(|i| !i.is_empty())
            .ok_or_else(|| AppError::Validation("Card issuer id is required".to_string()))?;

        match tenant {
            Some(_) => self.checkout_preference(request, tenant).await,
            None => self.direct_order(request, token, installments).await,
        }
    }

    /// Checkout Pro preference path. Under a tenant credential the
    /// commission is withheld as `marketplace_fee`; under the platform
    /// credential the full amount passes through.
    async fn checkout_preference(
        &self,
        request: &PaymentRequest,
        tenant: Option<&TenantCredential>,
    ) -> Result<PaymentRecord, AppError> {
        let (access_token, commission, net_amount, marketplace_fee, metadata_value) = match tenant {
            Some(credential) => {
                let tokens = credential
                    .oauth
                    .as_ref()
                    .ok_or(AppError::TenantNotAuthorized(credential.tenant_id))?;
                let (commission, net) = split_amounts(request.total_amount);
                (
                    tokens.access_token.clone(),
                    commission,
                    net,
                    Some(commission),
                    commission,
                )
            }
            None => (
                self.config.access_token.expose_secret().clone(),
                0.0,
                request.total_amount,
                None,
                request.total_amount,
            ),
        };

        let preference = self.build_preference(request, marketplace_fee, metadata_value);
        let response = self
            .provider
            .create_preference(&access_token, &preference)
            .await?;

        tracing::info!(
            preference_id = %response.id,
            split = tenant.is_some(),
            amount = request.total_amount,
            commission = commission,
            "Checkout preference created"
        );

        Ok(self.preference_record(request, &response, commission, net_amount))
    }

    /// Orders API path for direct card charges under the platform
    /// credential.
    async fn direct_order(
        &self,
        request: &PaymentRequest,
        card_token: &str,
        installments: u32,
    ) -> Result<PaymentRecord, AppError> {
        let idempotency_key = generate_reference(64);
        let amount = format_amount(request.total_amount);

        let order = OrderRequest {
            order_type: "online".to_string(),
            external_reference: generate_reference(64),
            capture_mode: "automatic".to_string(),
            processing_mode: "automatic".to_string(),
            total_amount: amount.clone(),
            payer: OrderPayer {
                first_name: request.payer_name.clone(),
                email: request.payer.email.clone(),
                identification: Identification {
                    id_type: request.payer.identification.id_type.clone(),
                    number: request.payer.identification.number.clone(),
                },
            },
            transactions: OrderTransactions {
                payments: vec![OrderPaymentRequest {
                    amount: amount.clone(),
                    payment_method: OrderPaymentMethod {
                        id: request.payment_method_id.clone(),
                        method_type: request.payment_type_id.clone(),
                        token: card_token.to_string(),
                        installments,
                    },
                }],
            },
            items: vec![OrderItem {
                title: request.title.clone(),
                unit_price: amount,
                quantity: 1,
                description: request.description.clone(),
            }],
        };

        let response = self
            .provider
            .create_order(
                self.config.access_token.expose_secret(),
                &idempotency_key,
                &order,
            )
            .await?;

        tracing::info!(
            order_id = %response.id,
            amount = request.total_amount,
            "Direct card order created"
        );

        self.order_record(request, response)
    }

    fn build_preference(
        &self,
        request: &PaymentRequest,
        marketplace_fee: Option<f64>,
        metadata_value: f64,
    ) -> PreferenceRequest {
        let mut metadata = HashMap::new();
        metadata.insert(self.config.marketplace.clone(), metadata_value);

        PreferenceRequest {
            items: vec![PreferenceItem {
                id: request.title.clone(),
                title: request.title.clone(),
                description: request.description.clone(),
                quantity: 1,
                currency_id: request.currency_id.clone(),
                unit_price: request.total_amount,
            }],
            payer: PreferencePayer {
                email: request.payer.email.clone(),
                identification: Identification {
                    id_type: request.payer.identification.id_type.clone(),
                    number: request.payer.identification.number.clone(),
                },
            },
            marketplace: self.config.marketplace.clone(),
            marketplace_fee,
            metadata,
            notification_url: self.config.notification_url.clone(),
            back_urls: PreferenceBackUrls {
                success: self.config.back_urls.success.clone(),
                pending: self.config.back_urls.pending.clone(),
                failure: self.config.back_urls.failure.clone(),
            },
            auto_return: "approved".to_string(),
        }
    }

    /// A preference is asynchronous: the payer completes it later through
    /// Checkout Pro, so the record starts out pending and is settled by the
    /// webhook reconciler.
    fn preference_record(
        &self,
        request: &PaymentRequest,
        response: &PreferenceResponse,
        commission: f64,
        net_amount: f64,
    ) -> PaymentRecord {
        let now = DateTime::now();
        let date_created = response.date_created.clone().unwrap_or_default();
        PaymentRecord {
            provider_payment_id: response.id.clone(),
            status: "pending".to_string(),
            status_detail: "pending".to_string(),
            description: request.description.clone(),
            modality: response.operation_type.clone().unwrap_or_default(),
            method: request.payment_method_id.clone(),
            payer_email: request.payer.email.clone(),
            payer_identification_type: request.payer.identification.id_type.clone(),
            payer_identification_number: request.payer.identification.number.clone(),
            total_amount: request.total_amount,
            commission,
            net_amount,
            currency: request.currency_id.clone(),
            date_approved: date_created.clone(),
            date_created,
            created_at: now,
            updated_at: now,
        }
    }

    fn order_record(
        &self,
        request: &PaymentRequest,
        response: OrderResponse,
    ) -> Result<PaymentRecord, AppError> {
        let payment = response
            .transactions
            .as_ref()
            .and_then(|t| t.payments.first())
            .ok_or_else(|| malformed("order response missing payment leg"))?;

        let status = payment
            .status
            .clone()
            .ok_or_else(|| malformed("order payment missing status"))?;
        let status_detail = payment
            .status_detail
            .clone()
            .ok_or_else(|| malformed("order payment missing status_detail"))?;
        let method = payment
            .payment_method
            .as_ref()
            .ok_or_else(|| malformed("order payment missing payment_method"))?;
        let method_id = method
            .id
            .clone()
            .ok_or_else(|| malformed("order payment_method missing id"))?;
        let method_type = method
            .method_type
            .clone()
            .ok_or_else(|| malformed("order payment_method missing type"))?;
        let total_paid = response
            .total_paid_amount
            .ok_or_else(|| malformed("order response missing total_paid_amount"))?;
        let date_created = response
            .created_date
            .ok_or_else(|| malformed("order response missing created_date"))?;
        let date_approved = response
            .last_updated_date
            .ok_or_else(|| malformed("order response missing last_updated_date"))?;

        let now = DateTime::now();
        Ok(PaymentRecord {
            provider_payment_id: response.id,
            status,
            status_detail,
            description: request.description.clone(),
            modality: method_type,
            method: method_id,
            payer_email: request.payer.email.clone(),
            payer_identification_type: request.payer.identification.id_type.clone(),
            payer_identification_number: request.payer.identification.number.clone(),
            total_amount: total_paid,
            commission: 0.0,
            net_amount: total_paid,
            currency: request.currency_id.clone(),
            date_created,
            date_approved,
            created_at: now,
            updated_at: now,
        })
    }
}

fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn malformed(detail: &str) -> AppError {
    AppError::Provider(ProviderError::Malformed(detail.to_string()))
}
