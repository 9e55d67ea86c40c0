//! Data synchronization from the connected node.
//!
//! Each fetch replaces one slot of the dashboard state. A fetch captures the
//! session generation before its first request and commits only if the
//! dashboard is still connected with that same generation; otherwise the result
//! belongs to an earlier session and is dropped.

use crate::controller::Dashboard;
use crate::state::{ConnectionState, DashboardState, DraftAsset};
use futures::future::join_all;
use tap_schema::{
    Asset, AssetType, FetchAssetMetaRequest, ListAssetsRequest, ListBatchesRequest,
    ListBatchesResponse,
};
use tracing::{debug, warn};

/// Flatten the assets of every not-yet-broadcast batch, in order.
pub fn pending_drafts(response: &ListBatchesResponse) -> Vec<DraftAsset> {
    response
        .batches
        .iter()
        .filter_map(|verbose| verbose.batch.as_ref())
        .filter(|batch| batch.state.is_pending())
        .flat_map(|batch| {
            let batch_key = batch.batch_key_hex().unwrap_or_default();
            batch.assets.iter().map(move |asset| DraftAsset {
                batch_key: batch_key.clone(),
                name: asset.name.clone(),
                amount: asset.amount,
                asset_type: asset.asset_type,
                decoded_meta: asset
                    .asset_meta
                    .as_ref()
                    .and_then(|meta| meta.decode_text().ok().flatten()),
            })
        })
        .collect()
}

impl Dashboard {
    /// Generation of the live session, `None` when not connected.
    async fn live_generation(&self, what: &str) -> Option<u64> {
        let state = self.inner.state.read().await;
        if state.connection == ConnectionState::Connected {
            Some(state.generation)
        } else {
            debug!("Not connected, skipping {} fetch", what);
            None
        }
    }

    /// Apply a fetch result unless the session changed meanwhile.
    async fn commit(
        &self,
        generation: u64,
        what: &str,
        apply: impl FnOnce(&mut DashboardState),
    ) {
        let mut state = self.inner.state.write().await;
        if state.connection == ConnectionState::Connected && state.generation == generation {
            apply(&mut state);
        } else {
            debug!("Discarding stale {} result", what);
        }
    }

    pub async fn fetch_node_info(&self) {
        let Some(generation) = self.live_generation("node info").await else {
            return;
        };
        let info = match self.inner.node.lightning().get_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Failed to fetch node info: {}", e);
                None
            }
        };
        self.commit(generation, "node info", |state| state.node_info = info)
            .await;
    }

    pub async fn fetch_channels(&self) {
        let Some(generation) = self.live_generation("channels").await else {
            return;
        };
        let channels = match self.inner.node.lightning().list_channels().await {
            Ok(response) => response.channels,
            Err(e) => {
                warn!("Failed to fetch channels: {}", e);
                Vec::new()
            }
        };
        self.commit(generation, "channels", |state| state.channels = channels)
            .await;
    }

    /// List owned assets and attach decoded metadata to collectibles.
    pub async fn fetch_assets(&self) {
        let Some(generation) = self.live_generation("assets").await else {
            return;
        };
        let request = ListAssetsRequest {
            with_witness: false,
            include_spent: false,
            include_leased: false,
            include_unconfirmed_mints: self.inner.config.include_unconfirmed_mints,
        };
        let assets = match self.inner.node.taproot_assets().list_assets(&request).await {
            Ok(response) => self.with_metadata(response.assets).await,
            Err(e) => {
                warn!("Failed to fetch assets: {}", e);
                Vec::new()
            }
        };
        debug!("Fetched {} assets", assets.len());
        self.commit(generation, "assets", |state| state.assets = assets)
            .await;
    }

    async fn with_metadata(&self, assets: Vec<Asset>) -> Vec<Asset> {
        let node = &self.inner.node;
        join_all(assets.into_iter().map(|mut asset| async move {
            if asset.kind() != AssetType::Collectible {
                return asset;
            }
            let Some(asset_id) = asset.asset_genesis.asset_id_hex() else {
                return asset;
            };
            let request = FetchAssetMetaRequest {
                asset_id_str: asset_id.clone(),
            };
            match node.taproot_assets().fetch_asset_meta(&request).await {
                Ok(meta) => match meta.decode_text() {
                    Ok(text) => asset.decoded_meta = text,
                    Err(e) => debug!("Undecodable metadata for asset {}: {}", asset_id, e),
                },
                Err(e) => warn!("Failed to fetch metadata for asset {}: {}", asset_id, e),
            }
            asset
        }))
        .await
    }

    /// Rebuild the pending batch from the node's batch listing.
    pub async fn fetch_batches(&self) {
        let Some(generation) = self.live_generation("batches").await else {
            return;
        };
        let drafts = match self
            .inner
            .node
            .mint()
            .list_batches(&ListBatchesRequest::default())
            .await
        {
            Ok(response) => pending_drafts(&response),
            Err(e) => {
                warn!("Failed to fetch batches: {}", e);
                Vec::new()
            }
        };
        self.commit(generation, "batches", |state| state.pending_batch = drafts)
            .await;
    }

    pub async fn fetch_peers(&self) {
        let Some(generation) = self.live_generation("peers").await else {
            return;
        };
        let peers = match self.inner.node.lightning().list_peers().await {
            Ok(response) => response.peers,
            Err(e) => {
                warn!("Failed to fetch peers: {}", e);
                Vec::new()
            }
        };
        self.commit(generation, "peers", |state| state.peers = peers)
            .await;
    }

    /// Run every fetch concurrently.
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.fetch_node_info(),
            self.fetch_channels(),
            self.fetch_assets(),
            self.fetch_batches(),
            self.fetch_peers(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::connected_dashboard;
    use lnc_adapter::memory::make_asset;
    use lnc_adapter::{Credentials, NodeConnector};
    use tap_schema::{AssetMeta, BatchState, MintingBatch, PendingAsset, VerboseBatch};

    fn batch(key: &str, state: BatchState, names: &[&str]) -> MintingBatch {
        MintingBatch {
            batch_key: key.to_string(),
            batch_txid: String::new(),
            state,
            assets: names
                .iter()
                .map(|name| PendingAsset {
                    asset_type: AssetType::Normal,
                    name: name.to_string(),
                    asset_meta: Some(AssetMeta::opaque_text("note")),
                    amount: 10,
                })
                .collect(),
        }
    }

    #[test]
    fn test_pending_drafts_keep_only_unbroadcast_batches() {
        let response = ListBatchesResponse {
            batches: vec![
                VerboseBatch {
                    batch: Some(batch("yv66vg==", BatchState::Pending, &["a", "b"])),
                },
                VerboseBatch {
                    batch: Some(batch("3q2+7w==", BatchState::Broadcast, &["c"])),
                },
                VerboseBatch {
                    batch: Some(batch("AQ==", BatchState::Frozen, &["d"])),
                },
                VerboseBatch {
                    batch: Some(batch("Ag==", BatchState::SeedlingCancelled, &["e"])),
                },
                VerboseBatch { batch: None },
            ],
        };
        let drafts = pending_drafts(&response);
        let names: Vec<_> = drafts.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d"]);
        assert_eq!(drafts[0].batch_key, "cafebabe");
        assert_eq!(drafts[2].batch_key, "01");
        assert_eq!(drafts[0].decoded_meta.as_deref(), Some("note"));
    }

    #[test]
    fn test_pending_drafts_tolerate_bad_metadata() {
        let mut pending = batch("yv66vg==", BatchState::Committed, &["a"]);
        pending.assets[0].asset_meta = Some(AssetMeta {
            data: "***".to_string(),
            ..AssetMeta::default()
        });
        let response = ListBatchesResponse {
            batches: vec![VerboseBatch {
                batch: Some(pending),
            }],
        };
        let drafts = pending_drafts(&response);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].decoded_meta, None);
    }

    #[tokio::test]
    async fn test_fetch_assets_decodes_collectible_metadata() {
        let (dashboard, node) = connected_dashboard().await;
        let art = make_asset("art", AssetType::Collectible, 1);
        node.add_asset(art, Some(AssetMeta::opaque_text("data:image/png;base64,AAAA")));

        dashboard.fetch_assets().await;
        let assets = dashboard.assets().await;
        let art = assets.iter().find(|a| a.name() == "art").unwrap();
        assert_eq!(art.decoded_meta.as_deref(), Some("data:image/png;base64,AAAA"));
        let coin = assets.iter().find(|a| a.name() == "coin").unwrap();
        assert_eq!(coin.decoded_meta, None);
    }

    #[tokio::test]
    async fn test_fetch_assets_is_stable() {
        let (dashboard, node) = connected_dashboard().await;
        node.add_asset(
            make_asset("art", AssetType::Collectible, 1),
            Some(AssetMeta::opaque_text("x")),
        );
        dashboard.fetch_assets().await;
        let first = dashboard.assets().await;
        dashboard.fetch_assets().await;
        assert_eq!(first, dashboard.assets().await);
    }

    #[tokio::test]
    async fn test_failed_metadata_keeps_asset() {
        let (dashboard, node) = connected_dashboard().await;
        let art = make_asset("art", AssetType::Collectible, 3);
        let id = art.asset_genesis.asset_id_hex().unwrap();
        node.add_asset(art.clone(), Some(AssetMeta::opaque_text("x")));
        node.fail_meta_for(&id);

        dashboard.fetch_assets().await;
        let assets = dashboard.assets().await;
        let fetched = assets.iter().find(|a| a.name() == "art").unwrap();
        assert_eq!(fetched, &art);
        assert_eq!(fetched.decoded_meta, None);
    }

    #[tokio::test]
    async fn test_failed_fetch_degrades_only_its_slot() {
        let (dashboard, node) = connected_dashboard().await;
        node.fail("get_info");
        node.fail("list_peers");
        dashboard.refresh_all().await;

        let state = dashboard.snapshot().await;
        assert!(state.node_info.is_none());
        assert!(state.peers.is_empty());
        assert!(!state.channels.is_empty());
        assert!(!state.assets.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_while_disconnected_is_noop() {
        let (dashboard, node) = connected_dashboard().await;
        dashboard.logout().await.unwrap();
        let calls = node.call_count("list_assets");
        dashboard.fetch_assets().await;
        assert_eq!(node.call_count("list_assets"), calls);
        assert!(dashboard.assets().await.is_empty());
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let (dashboard, _node) = connected_dashboard().await;
        let generation = dashboard.snapshot().await.generation;
        dashboard.logout().await.unwrap();

        dashboard
            .commit(generation, "channels", |state| {
                state.channels.push(Default::default())
            })
            .await;
        assert!(dashboard.channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_logout_during_asset_fetch_discards_result() {
        let (dashboard, node) = connected_dashboard().await;
        node.hold("list_assets");

        tokio::join!(dashboard.fetch_assets(), async {
            node.reached("list_assets").await;
            dashboard.logout().await.unwrap();
            // The node still answers the parked request.
            node.connect(&Credentials::new("stove lunar bright"))
                .await
                .unwrap();
            node.release("list_assets");
        });

        let state = dashboard.snapshot().await;
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert!(state.assets.is_empty());
        assert!(!dashboard.inner.store.has_session().unwrap());
        assert_eq!(node.call_count("list_assets"), 2);
    }
}
