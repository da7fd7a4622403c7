//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::db::{PgCatalog, PgDirectory, PgOrderStore};
use crate::line::{ChannelTokenCache, LineClient, LineError};
use crate::notifications::NotificationDispatcher;
use crate::services::{BillingService, OrderService};

/// LINE notifications; `None` when the channels are not configured.
pub type LineNotifier = Option<NotificationDispatcher<LineClient, PgDirectory>>;

pub type Orders = OrderService<PgCatalog, PgOrderStore, LineNotifier>;
pub type Billing = BillingService<PgOrderStore, PgDirectory, LineNotifier>;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. The token cache inside the
/// notifier is built once here and lives as long as the process.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    orders: Orders,
    billing: Billing,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns `LineError` if the LINE HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, LineError> {
        let notifier = build_notifier(&config, &pool)?;

        let orders = OrderService::new(
            PgCatalog::new(pool.clone()),
            PgOrderStore::new(pool.clone()),
            notifier.clone(),
            config.shipping_fees,
        );
        let billing = BillingService::new(
            PgOrderStore::new(pool.clone()),
            PgDirectory::new(pool.clone()),
            notifier,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                orders,
                billing,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn orders(&self) -> &Orders {
        &self.inner.orders
    }

    #[must_use]
    pub fn billing(&self) -> &Billing {
        &self.inner.billing
    }
}

fn build_notifier(config: &ServerConfig, pool: &PgPool) -> Result<LineNotifier, LineError> {
    let Some(line) = config.line() else {
        warn!("LINE channels not configured, order notifications disabled");
        return Ok(None);
    };

    let client = LineClient::new(line.api_base.clone(), line.send_timeout)?;
    info!(api_base = %line.api_base, "LINE notifications enabled");

    Ok(Some(NotificationDispatcher::new(
        ChannelTokenCache::new(client),
        PgDirectory::new(pool.clone()),
        line.buyer_channel.clone(),
        line.producer_channel.clone(),
        line.test_user_id.clone(),
    )))
}
