//! Dashboard core for a Taproot Assets node.
//!
//! This crate provides:
//! - The session lifecycle controller (pairing, restore, password login, logout)
//! - Data synchronization of node info, channels, assets, pending batch and peers
//! - Asset minting, batch finalization, channel funding and peer operations
//! - An HTTP API exposing all of the above

pub mod api;
pub mod controller;
pub mod error;
pub mod mutations;
pub mod state;
pub mod sync;

pub use controller::{Dashboard, DashboardConfig, Subscription, DEFAULT_FINALIZE_FEE_RATE};
pub use error::{friendly_message, DashboardError, ValidationError};
pub use state::{
    ConnectionState, DashboardState, DraftAsset, Feedback, FundChannelForm, MintForm,
    MintMetadata, Session,
};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{ConnectionState, Dashboard, DashboardConfig};
    use lnc_adapter::memory::make_asset;
    use lnc_adapter::{Credentials, MemoryNode};
    use std::sync::Arc;
    use std::time::Duration;
    use tap_schema::{AssetType, Channel, Peer};

    pub fn dashboard(config: DashboardConfig) -> (Dashboard, Arc<MemoryNode>) {
        let node = Arc::new(MemoryNode::new());
        let dashboard = Dashboard::in_memory(node.clone(), config).unwrap();
        (dashboard, node)
    }

    /// A dashboard connected to a node holding one channel, one peer and one asset.
    pub async fn connected_dashboard() -> (Dashboard, Arc<MemoryNode>) {
        let (dashboard, node) = dashboard(DashboardConfig::default());
        node.add_channel(Channel {
            active: true,
            remote_pubkey: "02aa".to_string(),
            channel_point: "ab:0".to_string(),
            chan_id: 1,
            capacity: 100_000,
            local_balance: 60_000,
            remote_balance: 40_000,
            private: false,
        });
        node.add_peer(Peer {
            pub_key: "02aa".to_string(),
            address: "10.0.0.1:9735".to_string(),
            ..Peer::default()
        });
        node.add_asset(make_asset("coin", AssetType::Normal, 1000), None);

        dashboard.init().await.unwrap();
        dashboard
            .connect(Credentials::new("stove lunar bright"))
            .await
            .unwrap();
        (dashboard, node)
    }

    /// Wait until the dashboard reaches `target`.
    pub async fn settle(dashboard: &Dashboard, target: ConnectionState) {
        let mut status = dashboard.subscribe_status();
        tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| *s == target))
            .await
            .expect("state not reached")
            .unwrap();
    }
}
