//! Persistence for tenant credentials and payment records.
//!
//! The stores are trait seams so the HTTP layer can run against in-memory
//! implementations in tests; the Mongo-backed implementations here are the
//! production path.

use anyhow::Result;
use async_trait::async_trait;
use mongodb::options::IndexOptions;
use mongodb::{bson::doc, Collection, Database, IndexModel};

use crate::models::{OauthTokens, PaymentRecord, TenantCredential};

/// Tenant credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, tenant_id: i64) -> Result<Option<TenantCredential>>;

    /// Register a tenant. Used when a company is onboarded, before any
    /// authorization has happened.
    async fn insert(&self, credential: TenantCredential) -> Result<()>;

    /// Overwrite the pending PKCE verifier for a new authorization attempt.
    async fn save_pending_verifier(&self, tenant_id: i64, verifier: &str) -> Result<()>;

    /// Store a freshly issued token pair and clear the pending verifier.
    /// `provider_account_id` is set on the first successful authorization.
    async fn save_tokens(
        &self,
        tenant_id: i64,
        tokens: &OauthTokens,
        provider_account_id: Option<&str>,
    ) -> Result<()>;
}

/// Payment record persistence, keyed by the provider-issued payment id.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, record: PaymentRecord) -> Result<()>;

    async fn find(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>>;

    /// Overwrite the provider-authoritative status fields. Both fields move
    /// in one update so a record never holds a mixed state.
    async fn update_status(
        &self,
        provider_payment_id: &str,
        status: &str,
        status_detail: &str,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct MongoCredentialStore {
    collection: Collection<TenantCredential>,
}

impl MongoCredentialStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("tenant_credentials"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let account_index = IndexModel::builder()
            .keys(doc! { "provider_account_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("provider_account_idx".to_string())
                    .sparse(true)
                    .build(),
            )
            .build();

        self.collection.create_indexes([account_index], None).await?;

        tracing::info!("Credential store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn find(&self, tenant_id: i64) -> Result<Option<TenantCredential>> {
        let filter = doc! { "_id": tenant_id };
        let credential = self.collection.find_one(filter, None).await?;
        Ok(credential)
    }

    async fn insert(&self, credential: TenantCredential) -> Result<()> {
        self.collection.insert_one(credential, None).await?;
        Ok(())
    }

    async fn save_pending_verifier(&self, tenant_id: i64, verifier: &str) -> Result<()> {
        let filter = doc! { "_id": tenant_id };
        let update = doc! {
            "$set": {
                "pending_code_verifier": verifier,
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        self.collection.update_one(filter, update, None).await?;
        Ok(())
    }

    async fn save_tokens(
        &self,
        tenant_id: i64,
        tokens: &OauthTokens,
        provider_account_id: Option<&str>,
    ) -> Result<()> {
        let filter = doc! { "_id": tenant_id };
        let mut set = doc! {
            "oauth": mongodb::bson::to_bson(tokens)?,
            "updated_at": mongodb::bson::DateTime::now()
        };
        if let Some(account_id) = provider_account_id {
            set.insert("provider_account_id", account_id);
        }
        let update = doc! {
            "$set": set,
            "$unset": { "pending_code_verifier": "" }
        };
        self.collection.update_one(filter, update, None).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    collection: Collection<PaymentRecord>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("payments"),
        }
    }

    pub async fn init_indexes(&self) -> Result<()> {
        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(
                IndexOptions::builder()
                    .name("payment_status_idx".to_string())
                    .build(),
            )
            .build();

        let created_index = IndexModel::builder()
            .keys(doc! { "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("payment_created_idx".to_string())
                    .build(),
            )
            .build();

        self.collection
            .create_indexes([status_index, created_index], None)
            .await?;

        tracing::info!("Payment store indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert(&self, record: PaymentRecord) -> Result<()> {
        self.collection.insert_one(record, None).await?;
        Ok(())
    }

    async fn find(&self, provider_payment_id: &str) -> Result<Option<PaymentRecord>> {
        let filter = doc! { "_id": provider_payment_id };
        let record = self.collection.find_one(filter, None).await?;
        Ok(record)
    }

    async fn update_status(
        &self,
        provider_payment_id: &str,
        status: &str,
        status_detail: &str,
    ) -> Result<()> {
        let filter = doc! { "_id": provider_payment_id };
        let update = doc! {
            "$set": {
                "status": status,
                "status_detail": status_detail,
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        self.collection.update_one(filter, update, None).await?;
        Ok(())
    }
}
