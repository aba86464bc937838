//! Exchange registry
//!
//! Holds one handle per initialized exchange. Each handle owns its
//! connector and memoizes the exchange's symbol catalog, loading it at most
//! once no matter how many requests race for it.

use std::collections::HashMap;
use std::sync::Arc;

use gateway_core::{Exchange, GatewayError, GatewayResult, UpstreamError};
use gateway_exchanges::{build_connector, ConnectorConfig, ExchangeConnector, MarketCatalog};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Connection to one exchange plus its lazily loaded catalog
pub struct ExchangeHandle {
    exchange: Exchange,
    connector: Arc<dyn ExchangeConnector>,
    /// `None` until the first successful load
    markets: Mutex<Option<Arc<MarketCatalog>>>,
}

impl ExchangeHandle {
    pub fn new(exchange: Exchange, connector: Arc<dyn ExchangeConnector>) -> Self {
        Self {
            exchange,
            connector,
            markets: Mutex::new(None),
        }
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn connector(&self) -> &dyn ExchangeConnector {
        self.connector.as_ref()
    }

    /// Load the catalog if it has not been loaded yet
    ///
    /// Concurrent callers queue on the slot lock; the first one performs the
    /// load and the rest observe its result. A failed load leaves the slot
    /// empty so the next caller retries.
    pub async fn ensure_markets_loaded(&self) -> Result<Arc<MarketCatalog>, UpstreamError> {
        let mut slot = self.markets.lock().await;
        if let Some(catalog) = slot.as_ref() {
            return Ok(Arc::clone(catalog));
        }

        debug!("Loading {} markets", self.exchange);
        let catalog = Arc::new(self.connector.load_markets().await?);
        info!("Loaded {} markets for {}", catalog.len(), self.exchange);

        *slot = Some(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Drop the memoized catalog so the next use reloads it
    pub async fn invalidate_markets(&self) {
        self.markets.lock().await.take();
    }

    pub async fn markets_loaded(&self) -> bool {
        self.markets.lock().await.is_some()
    }
}

/// One handle per exchange that initialized successfully
pub struct ExchangeRegistry {
    handles: HashMap<Exchange, Arc<ExchangeHandle>>,
}

impl ExchangeRegistry {
    /// Registry with a REST connector for every supported exchange
    pub fn new(config: &ConnectorConfig) -> Self {
        Self::build(|exchange| build_connector(exchange, config))
    }

    /// Build a registry with a custom connector factory
    ///
    /// Exchanges whose factory call fails are logged and left out.
    pub fn build<F>(mut factory: F) -> Self
    where
        F: FnMut(Exchange) -> Result<Arc<dyn ExchangeConnector>, UpstreamError>,
    {
        let mut handles = HashMap::new();

        for exchange in Exchange::ALL {
            match factory(exchange) {
                Ok(connector) => {
                    info!("Initialized {} connector", exchange.display_name());
                    handles.insert(exchange, Arc::new(ExchangeHandle::new(exchange, connector)));
                }
                Err(e) => {
                    error!("Failed to initialize {}: {}", exchange.display_name(), e);
                }
            }
        }

        Self { handles }
    }

    pub fn get_handle(&self, exchange: Exchange) -> GatewayResult<Arc<ExchangeHandle>> {
        self.handles
            .get(&exchange)
            .cloned()
            .ok_or_else(|| GatewayError::unsupported(exchange.id()))
    }

    #[instrument(skip(self))]
    pub async fn ensure_markets_loaded(
        &self,
        exchange: Exchange,
    ) -> GatewayResult<Arc<MarketCatalog>> {
        let handle = self.get_handle(exchange)?;
        handle
            .ensure_markets_loaded()
            .await
            .map_err(|e| GatewayError::fetch("markets", exchange.id(), e))
    }

    pub async fn invalidate_markets(&self, exchange: Exchange) -> GatewayResult<()> {
        self.get_handle(exchange)?.invalidate_markets().await;
        Ok(())
    }

    /// Registered exchanges in declaration order
    pub fn available(&self) -> Vec<Exchange> {
        Exchange::ALL
            .into_iter()
            .filter(|exchange| self.handles.contains_key(exchange))
            .collect()
    }
}
