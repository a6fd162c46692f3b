pub mod memory;
pub mod mercadopago;
pub mod metrics;
pub mod oauth;
pub mod payments;
pub mod reconciliation;
pub mod repository;
pub mod strategy;

pub use mercadopago::MercadoPagoClient;
pub use metrics::{get_metrics, init_metrics};
pub use oauth::OauthService;
pub use payments::PaymentService;
pub use reconciliation::ReconciliationService;
pub use repository::{CredentialStore, PaymentStore};
pub use strategy::PaymentStrategies;
