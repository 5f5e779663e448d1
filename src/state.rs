//! Application state management

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::ledger::{CreditLedger, CreditPolicy};
use crate::payments::RazorpayClient;
use crate::storage::S3Client;
use crate::viewer::ViewerSessions;

/// Timeout for outbound vendor and payment calls
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    s3_client: S3Client,
    db: SqlitePool,
    ledger: CreditLedger,
    gateway: Gateway,
    http: reqwest::Client,
    razorpay: Option<RazorpayClient>,
    viewer: ViewerSessions,
}

impl AppState {
    /// Build state with vendors taken from the configuration
    pub fn new(config: Config, s3_client: S3Client, db: SqlitePool) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let gateway = Gateway::from_config(&config.vendors, http.clone());
        Ok(Self::with_gateway(config, s3_client, db, gateway, http))
    }

    /// Build state around an explicit vendor registry
    pub fn with_gateway(
        config: Config,
        s3_client: S3Client,
        db: SqlitePool,
        gateway: Gateway,
        http: reqwest::Client,
    ) -> Self {
        let ledger = CreditLedger::new(db.clone(), CreditPolicy::from_config(&config.credits));
        let razorpay = config
            .payments
            .razorpay
            .as_ref()
            .map(|rz| RazorpayClient::new(rz, http.clone()));
        if razorpay.is_none() {
            tracing::warn!("Razorpay keys not set; purchases are unavailable");
        }

        Self {
            inner: Arc::new(AppStateInner {
                config,
                s3_client,
                db,
                ledger,
                gateway,
                http,
                razorpay,
                viewer: ViewerSessions::new(),
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the S3 client
    pub fn s3_client(&self) -> &S3Client {
        &self.inner.s3_client
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.inner.ledger
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    /// Shared outbound HTTP client
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Razorpay client, if keys are configured
    pub fn razorpay(&self) -> Option<&RazorpayClient> {
        self.inner.razorpay.as_ref()
    }

    pub fn viewer(&self) -> &ViewerSessions {
        &self.inner.viewer
    }
}
