//! In-memory store implementations.
//!
//! Back the same trait seams as the Mongo stores, for integration tests and
//! database-less local runs. Update semantics mirror Mongo's `update_one`:
//! a write against a missing key is a no-op, not an error.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use mongodb::bson::DateTime;

use crate::models::{OauthTokens, PaymentRecord, TenantCredential};
use crate::services::repository::{CredentialStore, PaymentStore};

#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: DashMap<i64, TenantCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find(&self, tenant_id: i64) -> Result<Option<TenantCredential>> {
        Ok(self.credentials.get(&tenant_id).map(|c| c.clone()))
    }

    async fn insert(&self, credential: TenantCredential) -> Result<()> {
        self.credentials.insert(credential.tenant_id, credential);
        Ok(())
    }

    async fn save_pending_verifier(&self, tenant_id: i64, verifier: &str) -> Result<()> {
        if let Some(mut credential) = self.credentials.get_mut(&tenant_id) {
            credential.pending_code_verifier = Some(verifier.to_string());
            credential.updated_at = DateTime::now();
        }
        Ok(())
    }

    async fn save_tokens(
        &self,
        tenant_id: i64,
        tokens: &OauthTokens,
        provider_account_id: Option<&str>,
    ) -> Result<()> {
        if let Some(mut credential) = self.credentials.get_mut(&tenant_id) {
            credential.oauth = Some(tokens.clone());
            credential.pending_code_verifier = None;
            if let Some(account_id) = provider_account_id {
                credential.provider_account_id = Some(account_id.to_string());
            }
            credential.updated_at = DateTime::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: DashMap<String, PaymentRecord>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        self.payments
            .insert(record.provider_payment_id.clone(), record);
        Ok(())
    }

    async fn find(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.get(provider_payment_id).map(|r| r.clone()))
    }

    async fn update_status(
        &self,
        provider_payment_id: &str,
        status: &str,
        status_detail: &str,
    ) -> Result<()> {
        if let Some(mut record) = self.payments.get_mut(provider_payment_id) {
            record.status = status.to_string();
            record.status_detail = status_detail.to_string();
            record.updated_at = DateTime::now();
        }
        Ok(())
    }
}
