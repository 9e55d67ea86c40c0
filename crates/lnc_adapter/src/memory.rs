//! In-memory node for tests and demos.
//!
//! Behaves like a small regtest node: minted assets collect in a pending
//! batch, finalizing turns them into owned assets, and session changes are
//! pushed as status strings. Failures can be scripted per method.

use crate::events::EventFeed;
use crate::{Credentials, Lightning, Mint, NodeConnector, NodeError, TapChannels, TaprootAssets};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tap_schema::{
    Asset, AssetMeta, AssetType, AssetVersion, BatchState, CancelBatchRequest,
    CancelBatchResponse, Chain, Channel, ConnectPeerRequest, ConnectPeerResponse,
    FetchAssetMetaRequest, FinalizeBatchRequest, FinalizeBatchResponse, FundChannelRequest,
    FundChannelResponse, GenesisInfo, ListAssetsRequest, ListAssetsResponse, ListBatchesRequest,
    ListBatchesResponse, ListChannelsResponse, ListPeersResponse, MintAssetRequest,
    MintAssetResponse, MintingBatch, NodeInfo, Peer, PendingAsset, VerboseBatch,
};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

/// gRPC status code `UNKNOWN`, used for scripted failures.
const UNKNOWN_CODE: i64 = 2;

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Build an owned asset whose id is derived from its name.
pub fn make_asset(name: &str, asset_type: AssetType, amount: u64) -> Asset {
    let id = digest(&[b"asset".as_slice(), name.as_bytes()]);
    let outpoint = digest(&[b"genesis".as_slice(), name.as_bytes()]);
    Asset {
        version: AssetVersion::V0,
        asset_genesis: GenesisInfo {
            genesis_point: format!("{}:0", hex::encode(outpoint)),
            name: name.to_string(),
            meta_hash: String::new(),
            asset_id: BASE64.encode(id),
            asset_id_str: hex::encode(id),
            asset_type: Some(asset_type),
            output_index: 0,
        },
        asset_type,
        amount,
        is_spent: false,
        decoded_meta: None,
    }
}

struct MemoryState {
    connected: bool,
    paired: bool,
    accepted_phrase: Option<String>,
    connect_error: Option<String>,
    failing: HashSet<String>,
    failing_meta: HashSet<String>,
    node_info: NodeInfo,
    channels: Vec<Channel>,
    peers: Vec<Peer>,
    assets: Vec<Asset>,
    metas: HashMap<String, AssetMeta>,
    batches: Vec<MintingBatch>,
    batch_counter: u32,
    calls: HashMap<String, usize>,
    mint_requests: Vec<MintAssetRequest>,
    finalize_requests: Vec<FinalizeBatchRequest>,
    fund_requests: Vec<FundChannelRequest>,
    peer_requests: Vec<ConnectPeerRequest>,
}

impl MemoryState {
    fn pending_batch_mut(&mut self) -> Option<&mut MintingBatch> {
        self.batches.iter_mut().find(|b| b.state == BatchState::Pending)
    }
}

/// Parks calls to one method until released.
#[derive(Default)]
struct Gate {
    reached: Notify,
    release: Notify,
}

/// A scriptable node living entirely in memory.
pub struct MemoryNode {
    state: Mutex<MemoryState>,
    status_subscribers: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
}

impl MemoryNode {
    pub fn new() -> Self {
        let identity = digest(&[b"memory-node".as_slice()]);
        let node_info = NodeInfo {
            alias: "memory-node".to_string(),
            identity_pubkey: format!("02{}", hex::encode(identity)),
            version: "0.18.0-beta".to_string(),
            block_height: 144,
            synced_to_chain: true,
            synced_to_graph: true,
            num_active_channels: 0,
            num_peers: 0,
            chains: vec![Chain {
                chain: "bitcoin".to_string(),
                network: "regtest".to_string(),
            }],
        };
        Self {
            state: Mutex::new(MemoryState {
                connected: false,
                paired: false,
                accepted_phrase: None,
                connect_error: None,
                failing: HashSet::new(),
                failing_meta: HashSet::new(),
                node_info,
                channels: Vec::new(),
                peers: Vec::new(),
                assets: Vec::new(),
                metas: HashMap::new(),
                batches: Vec::new(),
                batch_counter: 0,
                calls: HashMap::new(),
                mint_requests: Vec::new(),
                finalize_requests: Vec::new(),
                fund_requests: Vec::new(),
                peer_requests: Vec::new(),
            }),
            status_subscribers: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and apply scripted failures.
    fn enter(&self, method: &str) -> Result<MutexGuard<'_, MemoryState>, NodeError> {
        let mut state = self.lock();
        *state.calls.entry(method.to_string()).or_default() += 1;
        if !state.connected {
            return Err(NodeError::NotConnected);
        }
        if state.failing.contains(method) {
            return Err(NodeError::Rpc {
                code: UNKNOWN_CODE,
                message: format!("{} failed", method),
            });
        }
        Ok(state)
    }

    /// Park the next call to `method` (`connect` or `list_assets`) until
    /// [`MemoryNode::release`].
    pub fn hold(&self, method: &str) {
        self.gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method.to_string(), Arc::new(Gate::default()));
    }

    /// Wait until a call to a held `method` is parked.
    pub async fn reached(&self, method: &str) {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .cloned();
        if let Some(gate) = gate {
            gate.reached.notified().await;
        }
    }

    /// Let the parked call to `method` continue.
    pub fn release(&self, method: &str) {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(method);
        if let Some(gate) = gate {
            gate.release.notify_one();
        }
    }

    async fn pass_gate(&self, method: &str) {
        let gate = self
            .gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .cloned();
        if let Some(gate) = gate {
            debug!("Holding {} call", method);
            gate.reached.notify_one();
            gate.release.notified().await;
        }
    }

    /// Only accept this pairing phrase; others fail like an unknown session.
    pub fn accept_only(&self, pairing_phrase: &str) {
        self.lock().accepted_phrase = Some(pairing_phrase.trim().to_string());
    }

    /// Reject every connect with the given node message.
    pub fn reject_connect(&self, message: &str) {
        self.lock().connect_error = Some(message.to_string());
    }

    pub fn allow_connect(&self) {
        self.lock().connect_error = None;
    }

    /// Fail every call of `method` (e.g. `"list_channels"`).
    pub fn fail(&self, method: &str) {
        self.lock().failing.insert(method.to_string());
    }

    pub fn recover(&self, method: &str) {
        self.lock().failing.remove(method);
    }

    /// Fail metadata fetches for one asset id (hex).
    pub fn fail_meta_for(&self, asset_id_hex: &str) {
        self.lock().failing_meta.insert(asset_id_hex.to_string());
    }

    pub fn set_node_info(&self, info: NodeInfo) {
        self.lock().node_info = info;
    }

    pub fn add_channel(&self, channel: Channel) {
        self.lock().channels.push(channel);
    }

    pub fn add_peer(&self, peer: Peer) {
        self.lock().peers.push(peer);
    }

    /// Add an owned asset, with its metadata blob if any.
    pub fn add_asset(&self, asset: Asset, meta: Option<AssetMeta>) {
        let mut state = self.lock();
        if let (Some(id), Some(meta)) = (asset.asset_genesis.asset_id_hex(), meta) {
            state.metas.insert(id, meta);
        }
        state.assets.push(asset);
    }

    pub fn add_batch(&self, batch: MintingBatch) {
        self.lock().batches.push(batch);
    }

    /// Number of calls made to `method`, failed ones included.
    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn mint_requests(&self) -> Vec<MintAssetRequest> {
        self.lock().mint_requests.clone()
    }

    pub fn finalize_requests(&self) -> Vec<FinalizeBatchRequest> {
        self.lock().finalize_requests.clone()
    }

    pub fn fund_requests(&self) -> Vec<FundChannelRequest> {
        self.lock().fund_requests.clone()
    }

    pub fn peer_requests(&self) -> Vec<ConnectPeerRequest> {
        self.lock().peer_requests.clone()
    }

    /// Push a status string to every subscriber.
    pub fn emit_status(&self, status: &str) {
        let mut subscribers = self
            .status_subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(status.to_string()).is_ok());
    }

    /// Simulate a transport drop; the pairing survives.
    pub fn drop_transport(&self) {
        self.lock().connected = false;
        self.emit_status("disconnected");
    }

    /// Simulate the transport coming back for the same pairing.
    pub fn restore_transport(&self) {
        let paired = {
            let mut state = self.lock();
            state.connected = state.paired;
            state.paired
        };
        if paired {
            self.emit_status("connected");
        }
    }
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeConnector for MemoryNode {
    async fn connect(&self, credentials: &Credentials) -> Result<(), NodeError> {
        self.pass_gate("connect").await;
        {
            let mut state = self.lock();
            *state.calls.entry("connect".to_string()).or_default() += 1;
            if let Some(message) = &state.connect_error {
                return Err(NodeError::Rejected(message.clone()));
            }
            if let Some(accepted) = &state.accepted_phrase {
                if accepted != credentials.pairing_phrase.trim() {
                    return Err(NodeError::Rejected("stream not found".to_string()));
                }
            }
            state.paired = true;
            state.connected = true;
        }
        debug!("Memory node paired");
        self.emit_status("connected");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        let state = self.lock();
        state.paired && state.connected
    }

    fn is_paired(&self) -> bool {
        self.lock().paired
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn disconnect(&self) {
        let was_connected = {
            let mut state = self.lock();
            let was = state.connected;
            state.connected = false;
            state.paired = false;
            was
        };
        if was_connected {
            self.emit_status("disconnected");
        }
    }

    fn events(&self) -> EventFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.status_subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        EventFeed::StatusStream(rx)
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
impl Lightning for MemoryNode {
    async fn get_info(&self) -> Result<NodeInfo, NodeError> {
        let state = self.enter("get_info")?;
        let mut info = state.node_info.clone();
        info.num_active_channels = state.channels.iter().filter(|c| c.active).count() as u32;
        info.num_peers = state.peers.len() as u32;
        Ok(info)
    }

    async fn list_channels(&self) -> Result<ListChannelsResponse, NodeError> {
        let state = self.enter("list_channels")?;
        Ok(ListChannelsResponse {
            channels: state.channels.clone(),
        })
    }

    async fn list_peers(&self) -> Result<ListPeersResponse, NodeError> {
        let state = self.enter("list_peers")?;
        Ok(ListPeersResponse {
            peers: state.peers.clone(),
        })
    }

    async fn connect_peer(
        &self,
        request: &ConnectPeerRequest,
    ) -> Result<ConnectPeerResponse, NodeError> {
        let mut state = self.enter("connect_peer")?;
        state.peer_requests.push(request.clone());
        if state.peers.iter().any(|p| p.pub_key == request.addr.pubkey) {
            return Err(NodeError::Rpc {
                code: UNKNOWN_CODE,
                message: format!("already connected to peer: {}", request.addr.pubkey),
            });
        }
        state.peers.push(Peer {
            pub_key: request.addr.pubkey.clone(),
            address: request.addr.host.clone(),
            ..Peer::default()
        });
        Ok(ConnectPeerResponse {})
    }
}

#[async_trait]
impl TaprootAssets for MemoryNode {
    async fn list_assets(
        &self,
        request: &ListAssetsRequest,
    ) -> Result<ListAssetsResponse, NodeError> {
        self.pass_gate("list_assets").await;
        let state = self.enter("list_assets")?;
        let assets = state
            .assets
            .iter()
            .filter(|a| request.include_spent || !a.is_spent)
            .cloned()
            .collect();
        Ok(ListAssetsResponse { assets })
    }

    async fn fetch_asset_meta(
        &self,
        request: &FetchAssetMetaRequest,
    ) -> Result<AssetMeta, NodeError> {
        let state = self.enter("fetch_asset_meta")?;
        if state.failing_meta.contains(&request.asset_id_str) {
            return Err(NodeError::Rpc {
                code: UNKNOWN_CODE,
                message: format!("unable to fetch meta for {}", request.asset_id_str),
            });
        }
        state
            .metas
            .get(&request.asset_id_str)
            .cloned()
            .ok_or_else(|| NodeError::Rpc {
                code: UNKNOWN_CODE,
                message: "asset meta not found".to_string(),
            })
    }
}

#[async_trait]
impl Mint for MemoryNode {
    async fn mint_asset(&self, request: &MintAssetRequest) -> Result<MintAssetResponse, NodeError> {
        let mut state = self.enter("mint_asset")?;
        state.mint_requests.push(request.clone());

        if state.pending_batch_mut().is_none() {
            state.batch_counter += 1;
            let key = digest(&[b"batch".as_slice(), &state.batch_counter.to_be_bytes()]);
            state.batches.push(MintingBatch {
                batch_key: BASE64.encode(key),
                state: BatchState::Pending,
                ..MintingBatch::default()
            });
        }

        let asset = &request.asset;
        let batch = state
            .pending_batch_mut()
            .ok_or_else(|| NodeError::InvalidResponse("no pending batch".to_string()))?;
        batch.assets.push(PendingAsset {
            asset_type: asset.asset_type,
            name: asset.name.clone(),
            asset_meta: Some(asset.asset_meta.clone()),
            amount: asset.amount,
        });
        Ok(MintAssetResponse {
            pending_batch: Some(batch.clone()),
        })
    }

    async fn finalize_batch(
        &self,
        request: &FinalizeBatchRequest,
    ) -> Result<FinalizeBatchResponse, NodeError> {
        let mut state = self.enter("finalize_batch")?;
        state.finalize_requests.push(request.clone());

        let batch = match state.pending_batch_mut() {
            Some(batch) => {
                batch.state = BatchState::Broadcast;
                let txid = digest(&[b"txid".as_slice(), batch.batch_key.as_bytes()]);
                batch.batch_txid = hex::encode(txid);
                batch.clone()
            }
            None => {
                return Err(NodeError::Rpc {
                    code: UNKNOWN_CODE,
                    message: "no pending batch".to_string(),
                })
            }
        };

        for pending in &batch.assets {
            let asset = make_asset(&pending.name, pending.asset_type, pending.amount);
            let id = asset.asset_genesis.asset_id_hex();
            if let (Some(id), Some(meta)) = (id, &pending.asset_meta) {
                if !meta.data.is_empty() {
                    state.metas.insert(id, meta.clone());
                }
            }
            state.assets.push(asset);
        }

        Ok(FinalizeBatchResponse { batch: Some(batch) })
    }

    async fn cancel_batch(
        &self,
        _request: &CancelBatchRequest,
    ) -> Result<CancelBatchResponse, NodeError> {
        let mut state = self.enter("cancel_batch")?;
        match state.pending_batch_mut() {
            Some(batch) => {
                batch.state = BatchState::SeedlingCancelled;
                Ok(CancelBatchResponse {
                    batch_key: batch.batch_key.clone(),
                })
            }
            None => Err(NodeError::Rpc {
                code: UNKNOWN_CODE,
                message: "no pending batch".to_string(),
            }),
        }
    }

    async fn list_batches(
        &self,
        _request: &ListBatchesRequest,
    ) -> Result<ListBatchesResponse, NodeError> {
        let state = self.enter("list_batches")?;
        let batches = state
            .batches
            .iter()
            .map(|b| VerboseBatch {
                batch: Some(b.clone()),
            })
            .collect();
        Ok(ListBatchesResponse { batches })
    }
}

#[async_trait]
impl TapChannels for MemoryNode {
    async fn fund_channel(
        &self,
        request: &FundChannelRequest,
    ) -> Result<FundChannelResponse, NodeError> {
        let mut state = self.enter("fund_channel")?;
        state.fund_requests.push(request.clone());
        let txid = digest(&[request.asset_id.as_bytes(), request.peer_pubkey.as_bytes()]);
        Ok(FundChannelResponse {
            txid: hex::encode(txid),
            output_index: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionEvent;
    use tap_schema::{LightningAddress, MintAsset};

    fn mint_request(name: &str, asset_type: AssetType) -> MintAssetRequest {
        MintAssetRequest {
            asset: MintAsset {
                asset_version: 0,
                asset_type,
                name: name.to_string(),
                amount: 1,
                asset_meta: AssetMeta::opaque_text("meta"),
            },
            short_response: false,
        }
    }

    #[tokio::test]
    async fn test_calls_fail_before_connect() {
        let node = MemoryNode::new();
        let err = node.lightning().list_channels().await.unwrap_err();
        assert!(matches!(err, NodeError::NotConnected));
        assert_eq!(node.call_count("list_channels"), 1);
    }

    #[tokio::test]
    async fn test_connect_checks_phrase() {
        let node = MemoryNode::new();
        node.accept_only("right words");

        let err = node.connect(&Credentials::new("wrong words")).await.unwrap_err();
        assert_eq!(err.message(), "stream not found");
        assert!(!node.is_paired());

        node.connect(&Credentials::new(" right words ")).await.unwrap();
        assert!(node.is_ready());
    }

    #[tokio::test]
    async fn test_status_stream_reports_transport_changes() {
        let node = MemoryNode::new();
        let mut feed = node.events();
        node.connect(&Credentials::new("phrase")).await.unwrap();
        node.drop_transport();
        node.restore_transport();

        assert_eq!(feed.next().await, Some(ConnectionEvent::Connected));
        assert_eq!(feed.next().await, Some(ConnectionEvent::Disconnected));
        assert_eq!(feed.next().await, Some(ConnectionEvent::Connected));
        assert!(node.is_ready());
    }

    #[tokio::test]
    async fn test_mint_finalize_flow() {
        let node = MemoryNode::new();
        node.connect(&Credentials::new("phrase")).await.unwrap();

        let first = node
            .mint()
            .mint_asset(&mint_request("a", AssetType::Normal))
            .await
            .unwrap();
        let second = node
            .mint()
            .mint_asset(&mint_request("b", AssetType::Collectible))
            .await
            .unwrap();
        let key = first.pending_batch.unwrap().batch_key;
        let batch = second.pending_batch.unwrap();
        assert_eq!(batch.batch_key, key);
        assert_eq!(batch.assets.len(), 2);

        let finalized = node
            .mint()
            .finalize_batch(&FinalizeBatchRequest {
                short_response: false,
                fee_rate: 10,
            })
            .await
            .unwrap();
        assert_eq!(finalized.batch.unwrap().state, BatchState::Broadcast);

        let assets = node
            .taproot_assets()
            .list_assets(&ListAssetsRequest::default())
            .await
            .unwrap()
            .assets;
        assert_eq!(assets.len(), 2);

        let id = assets[1].asset_genesis.asset_id_hex().unwrap();
        let meta = node
            .taproot_assets()
            .fetch_asset_meta(&FetchAssetMetaRequest { asset_id_str: id })
            .await
            .unwrap();
        assert_eq!(meta.decode_text().unwrap().as_deref(), Some("meta"));
    }

    #[tokio::test]
    async fn test_cancel_without_batch_fails() {
        let node = MemoryNode::new();
        node.connect(&Credentials::new("phrase")).await.unwrap();
        assert!(node.mint().cancel_batch(&CancelBatchRequest {}).await.is_err());

        node.mint()
            .mint_asset(&mint_request("a", AssetType::Normal))
            .await
            .unwrap();
        let resp = node.mint().cancel_batch(&CancelBatchRequest {}).await.unwrap();
        assert!(!resp.batch_key.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let node = MemoryNode::new();
        node.connect(&Credentials::new("phrase")).await.unwrap();
        node.fail("get_info");
        assert!(node.lightning().get_info().await.is_err());
        node.recover("get_info");
        assert_eq!(node.lightning().get_info().await.unwrap().alias, "memory-node");

        let asset = make_asset("art", AssetType::Collectible, 1);
        let id = asset.asset_genesis.asset_id_hex().unwrap();
        node.add_asset(asset, Some(AssetMeta::opaque_text("x")));
        node.fail_meta_for(&id);
        assert!(node
            .taproot_assets()
            .fetch_asset_meta(&FetchAssetMetaRequest { asset_id_str: id })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_connect_peer_adds_peer_once() {
        let node = MemoryNode::new();
        node.connect(&Credentials::new("phrase")).await.unwrap();
        let request = ConnectPeerRequest {
            addr: LightningAddress::parse("02ab@10.0.0.1:9735").unwrap(),
            perm: false,
        };
        node.lightning().connect_peer(&request).await.unwrap();
        assert!(node.lightning().connect_peer(&request).await.is_err());
        assert_eq!(node.lightning().list_peers().await.unwrap().peers.len(), 1);
        assert_eq!(node.peer_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_held_connect_waits_for_release() {
        let node = MemoryNode::new();
        node.hold("connect");
        let creds = Credentials::new("phrase");
        let (result, _) = tokio::join!(node.connect(&creds), async {
            node.reached("connect").await;
            assert!(!node.is_connected());
            node.release("connect");
        });
        result.unwrap();
        assert!(node.is_connected());

        // Released gates no longer park calls.
        node.disconnect();
        node.connect(&Credentials::new("phrase")).await.unwrap();
        assert_eq!(node.call_count("connect"), 2);
    }
}
