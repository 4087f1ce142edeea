//! Marketplace seam for the sync pipeline.

use std::future::Future;

use mktsync_core::{AppConfig, Platform, TokenGrant};
use mktsync_meli::{MeliClient, MeliError, OrderSearchQuery, OrdersPage, RawOrder, RawShipment};

/// Remote order, shipment and token endpoints of one marketplace.
pub trait MarketplaceApi: Send + Sync {
    /// Platform this client ingests.
    fn platform(&self) -> Platform;

    fn search_orders(
        &self,
        access_token: &str,
        query: &OrderSearchQuery,
    ) -> impl Future<Output = Result<OrdersPage, MeliError>> + Send;

    fn get_order(
        &self,
        access_token: &str,
        order_id: &str,
    ) -> impl Future<Output = Result<RawOrder, MeliError>> + Send;

    fn get_shipment(
        &self,
        access_token: &str,
        shipment_id: &str,
    ) -> impl Future<Output = Result<RawShipment, MeliError>> + Send;

    fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, MeliError>> + Send;
}

/// [`MeliClient`] bound to the application's OAuth client credentials.
#[derive(Clone)]
pub struct MeliApi {
    client: MeliClient,
    client_id: String,
    client_secret: String,
}

impl MeliApi {
    #[must_use]
    pub fn new(client: MeliClient, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            client_id,
            client_secret,
        }
    }

    /// # Errors
    ///
    /// Returns [`MeliError`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, MeliError> {
        Ok(Self::new(
            MeliClient::from_config(config)?,
            config.meli_client_id.clone(),
            config.meli_client_secret.clone(),
        ))
    }
}

impl MarketplaceApi for MeliApi {
    fn platform(&self) -> Platform {
        Platform::Meli
    }

    async fn search_orders(
        &self,
        access_token: &str,
        query: &OrderSearchQuery,
    ) -> Result<OrdersPage, MeliError> {
        self.client.search_orders(access_token, query).await
    }

    async fn get_order(&self, access_token: &str, order_id: &str) -> Result<RawOrder, MeliError> {
        self.client.get_order(access_token, order_id).await
    }

    async fn get_shipment(
        &self,
        access_token: &str,
        shipment_id: &str,
    ) -> Result<RawShipment, MeliError> {
        self.client.get_shipment(access_token, shipment_id).await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, MeliError> {
        self.client
            .refresh_token(&self.client_id, &self.client_secret, refresh_token)
            .await
    }
}
