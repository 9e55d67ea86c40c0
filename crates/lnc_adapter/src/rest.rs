//! Connector for a node's integrated REST gateway.
//!
//! The gateway exposes every subsystem under `/v1/...` and authenticates with a
//! hex macaroon in the `Grpc-Metadata-macaroon` header. The pairing phrase slot
//! of [`Credentials`] carries that macaroon.

use crate::events::{ConnectionEvent, EventEmitter, EventFeed};
use crate::{Credentials, Lightning, Mint, NodeConnector, NodeError, TapChannels, TaprootAssets};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tap_schema::{
    AssetMeta, CancelBatchRequest, CancelBatchResponse, ConnectPeerRequest, ConnectPeerResponse,
    FetchAssetMetaRequest, FinalizeBatchRequest, FinalizeBatchResponse, FundChannelRequest,
    FundChannelResponse, ListAssetsRequest, ListAssetsResponse, ListBatchesRequest,
    ListBatchesResponse, ListChannelsResponse, ListPeersResponse, MintAssetRequest,
    MintAssetResponse, NodeInfo,
};
use tracing::{debug, info, warn};

/// Default gateway endpoint of a local Lightning Terminal.
pub const DEFAULT_NODE_URL: &str = "https://localhost:8443";

const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// REST gateway settings.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    /// Local nodes usually serve a self-signed certificate.
    pub accept_invalid_certs: bool,
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NODE_URL.to_string(),
            accept_invalid_certs: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Error body returned by the gateway.
#[derive(Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Parse a non-success response body into a [`NodeError`].
fn error_from_body(status: u16, body: String) -> NodeError {
    match serde_json::from_str::<GatewayError>(&body) {
        Ok(err) if !err.message.is_empty() => NodeError::Rpc {
            code: err.code,
            message: err.message,
        },
        _ => NodeError::Api { status, body },
    }
}

/// Node session over the REST gateway.
pub struct RestConnector {
    client: reqwest::Client,
    base_url: String,
    macaroon: RwLock<Option<String>>,
    connected: AtomicBool,
    events: EventEmitter,
}

impl RestConnector {
    pub fn new(config: RestConfig) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            macaroon: RwLock::new(None),
            connected: AtomicBool::new(false),
            events: EventEmitter::new(),
        })
    }

    /// Create a connector for the given gateway URL with default settings.
    pub fn with_url(url: &str) -> Result<Self, NodeError> {
        Self::new(RestConfig {
            base_url: url.to_string(),
            ..RestConfig::default()
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn current_macaroon(&self) -> Result<String, NodeError> {
        self.macaroon
            .read()
            .ok()
            .and_then(|m| m.clone())
            .ok_or(NodeError::NotConnected)
    }

    fn set_macaroon(&self, macaroon: Option<String>) {
        if let Ok(mut slot) = self.macaroon.write() {
            *slot = macaroon;
        }
    }

    /// Mark the transport as working again after a successful request.
    fn mark_reachable(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            info!("Reached {}", self.base_url);
            self.events.emit(ConnectionEvent::Connected);
        }
    }

    /// Mark the transport as lost, emitting one event per transition.
    fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!("Lost connection to {}", self.base_url);
            self.events.emit(ConnectionEvent::Disconnected);
        }
    }

    async fn send<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<R, NodeError> {
        let macaroon = self.current_macaroon()?;
        let response = match request.header(MACAROON_HEADER, macaroon).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    self.mark_disconnected();
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), body));
        }

        let body = response.text().await?;
        let parsed =
            serde_json::from_str(&body).map_err(|e| NodeError::InvalidResponse(e.to_string()))?;
        self.mark_reachable();
        Ok(parsed)
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, NodeError> {
        debug!("GET {}", path);
        self.send(self.client.get(self.url(path))).await
    }

    async fn get_with_query<Q: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<R, NodeError> {
        debug!("GET {} (query)", path);
        self.send(self.client.get(self.url(path)).query(query)).await
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, NodeError> {
        debug!("POST {}", path);
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl NodeConnector for RestConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<(), NodeError> {
        let macaroon = credentials.pairing_phrase.trim().to_ascii_lowercase();
        if macaroon.is_empty() || hex::decode(&macaroon).is_err() {
            return Err(NodeError::Rejected(
                "pairing phrase is not a hex macaroon".to_string(),
            ));
        }

        self.set_macaroon(Some(macaroon));
        match self.get::<NodeInfo>("/v1/getinfo").await {
            Ok(info) => {
                info!("Connected to {} ({})", info.alias, self.base_url);
                Ok(())
            }
            Err(e) => {
                self.set_macaroon(None);
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn is_ready(&self) -> bool {
        self.is_paired() && self.is_connected()
    }

    fn is_paired(&self) -> bool {
        self.macaroon.read().map(|m| m.is_some()).unwrap_or(false)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        self.set_macaroon(None);
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnected from {}", self.base_url);
            self.events.emit(ConnectionEvent::Disconnected);
        }
    }

    fn events(&self) -> EventFeed {
        self.events.subscribe()
    }

    fn lightning(&self) -> &dyn Lightning {
        self
    }

    fn taproot_assets(&self) -> &dyn TaprootAssets {
        self
    }

    fn mint(&self) -> &dyn Mint {
        self
    }

    fn tap_channels(&self) -> &dyn TapChannels {
        self
    }
}

#[async_trait]
impl Lightning for RestConnector {
    async fn get_info(&self) -> Result<NodeInfo, NodeError> {
        self.get("/v1/getinfo").await
    }

    async fn list_channels(&self) -> Result<ListChannelsResponse, NodeError> {
        self.get("/v1/channels").await
    }

    async fn list_peers(&self) -> Result<ListPeersResponse, NodeError> {
        self.get("/v1/peers").await
    }

    async fn connect_peer(
        &self,
        request: &ConnectPeerRequest,
    ) -> Result<ConnectPeerResponse, NodeError> {
        self.post("/v1/peers", request).await
    }
}

#[async_trait]
impl TaprootAssets for RestConnector {
    async fn list_assets(
        &self,
        request: &ListAssetsRequest,
    ) -> Result<ListAssetsResponse, NodeError> {
        self.get_with_query("/v1/taproot-assets/assets", request).await
    }

    async fn fetch_asset_meta(
        &self,
        request: &FetchAssetMetaRequest,
    ) -> Result<AssetMeta, NodeError> {
        if hex::decode(&request.asset_id_str).is_err() {
            return Err(NodeError::InvalidResponse(format!(
                "asset id {:?} is not hex",
                request.asset_id_str
            )));
        }
        let path = format!(
            "/v1/taproot-assets/assets/meta/asset-id/{}",
            request.asset_id_str
        );
        self.get(&path).await
    }
}

#[async_trait]
impl Mint for RestConnector {
    async fn mint_asset(&self, request: &MintAssetRequest) -> Result<MintAssetResponse, NodeError> {
        self.post("/v1/taproot-assets/assets", request).await
    }

    async fn finalize_batch(
        &self,
        request: &FinalizeBatchRequest,
    ) -> Result<FinalizeBatchResponse, NodeError> {
        self.post("/v1/taproot-assets/assets/mint/finalize", request)
            .await
    }

    async fn cancel_batch(
        &self,
        request: &CancelBatchRequest,
    ) -> Result<CancelBatchResponse, NodeError> {
        self.post("/v1/taproot-assets/assets/mint/cancel", request)
            .await
    }

    async fn list_batches(
        &self,
        request: &ListBatchesRequest,
    ) -> Result<ListBatchesResponse, NodeError> {
        self.get_with_query("/v1/taproot-assets/assets/mint/batches", request)
            .await
    }
}

#[async_trait]
impl TapChannels for RestConnector {
    async fn fund_channel(
        &self,
        request: &FundChannelRequest,
    ) -> Result<FundChannelResponse, NodeError> {
        self.post("/v1/taproot-assets/channels/fund", request).await
    }
}
