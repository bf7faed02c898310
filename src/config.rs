use std::env;

use crate::pricing::PricingConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub paypal_api_url: String,
    pub paypal_client_id: String,
    pub paypal_app_secret: String,
    pub paypal_timeout_secs: u64,
    pub pricing: PricingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let paypal_api_url = env::var("PAYPAL_API_URL")
            .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string());
        let paypal_client_id = env::var("PAYPAL_CLIENT_ID").unwrap_or_default();
        let paypal_app_secret = env::var("PAYPAL_APP_SECRET").unwrap_or_default();
        let paypal_timeout_secs = env::var("PAYPAL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        Ok(Self {
            database_url,
            host,
            port,
            paypal_api_url,
            paypal_client_id,
            paypal_app_secret,
            paypal_timeout_secs,
            pricing: PricingConfig::from_env(),
        })
    }
}
