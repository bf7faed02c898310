use std::sync::Arc;

use crate::db::{DbPool, OrmConn};
use crate::payment::PaymentGateway;
use crate::pricing::PricingConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub pricing: PricingConfig,
    pub payments: Arc<dyn PaymentGateway>,
}
