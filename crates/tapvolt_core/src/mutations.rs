//! Asset, batch, channel and peer operations.
//!
//! Every operation keeps its form in the dashboard state, reports its outcome
//! in the form's feedback slot, and clears the form only on success. Follow-up
//! fetches run through the named `on_*` hooks.

use crate::controller::Dashboard;
use crate::error::{DashboardError, ValidationError};
use crate::state::{
    ConnectionState, Feedback, FeedbackSlot, FundChannelForm, MintForm, MintMetadata,
};
use tap_schema::encoding::{base64_to_hex, data_uri, mime_for_file_name};
use tap_schema::{
    AssetMeta, CancelBatchRequest, ConnectPeerRequest, FinalizeBatchRequest, FundChannelRequest,
    FundChannelResponse, LightningAddress, MintAsset, MintAssetRequest, MintingBatch,
};
use tracing::{info, warn};

/// Parse a form field that must hold a positive integer.
pub fn parse_positive(value: &str, field: &'static str) -> Result<u64, ValidationError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::NotPositiveInteger(field)),
    }
}

/// Validate a mint form and build the request for it.
pub fn build_mint_request(form: &MintForm) -> Result<MintAssetRequest, ValidationError> {
    let name: String = form.name.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    let amount = parse_positive(&form.amount, "Amount")?;

    let meta_text = match &form.metadata {
        MintMetadata::None => String::new(),
        MintMetadata::Text(text) => text.clone(),
        MintMetadata::File { file_name, bytes } => data_uri(mime_for_file_name(file_name), bytes),
    };

    Ok(MintAssetRequest {
        asset: MintAsset {
            asset_version: 0,
            asset_type: form.asset_type,
            name: name.to_string(),
            amount,
            asset_meta: AssetMeta::opaque_text(&meta_text),
        },
        short_response: false,
    })
}

/// Validate a funding form and build the request for it.
pub fn build_fund_channel_request(
    form: &FundChannelForm,
) -> Result<FundChannelRequest, ValidationError> {
    let amount = parse_positive(&form.amount, "Amount")?;
    let fee_rate = parse_positive(&form.fee_rate, "Fee rate")?;
    let fee_rate =
        u32::try_from(fee_rate).map_err(|_| ValidationError::NotPositiveInteger("Fee rate"))?;
    Ok(FundChannelRequest::from_hex(
        &form.asset_id,
        &form.peer_pubkey,
        amount,
        fee_rate,
    )?)
}

impl Dashboard {
    async fn require_connected(&self) -> Result<(), DashboardError> {
        if self.inner.state.read().await.connection == ConnectionState::Connected {
            Ok(())
        } else {
            Err(DashboardError::NotConnected)
        }
    }

    async fn set_feedback(&self, slot: FeedbackSlot, feedback: Feedback) {
        *self.inner.state.write().await.feedback_mut(slot) = feedback;
    }

    /// Report a failed operation in its feedback slot.
    async fn report<T>(
        &self,
        slot: FeedbackSlot,
        result: Result<T, DashboardError>,
    ) -> Result<T, DashboardError> {
        if let Err(e) = &result {
            warn!("{:?} operation failed: {}", slot, e);
            self.set_feedback(slot, Feedback::Error(e.to_string())).await;
        }
        result
    }

    /// Add an asset to the pending batch. Returns the hex batch key.
    pub async fn mint_asset(&self, form: MintForm) -> Result<String, DashboardError> {
        self.inner.state.write().await.mint_form = form.clone();
        let result: Result<String, DashboardError> = async {
            let request = build_mint_request(&form)?;
            self.require_connected().await?;
            let response = self.inner.node.mint().mint_asset(&request).await?;
            response
                .pending_batch
                .and_then(|batch| batch.batch_key_hex())
                .ok_or_else(|| {
                    DashboardError::UnexpectedResponse("mint returned no pending batch".to_string())
                })
        }
        .await;
        let batch_key = self.report(FeedbackSlot::Mint, result).await?;

        info!("Minted {} into batch {}", form.name.trim(), batch_key);
        {
            let mut state = self.inner.state.write().await;
            state.mint_form = MintForm::default();
            state.mint_feedback = Feedback::Success(format!("Asset added to batch {}", batch_key));
        }
        self.on_mint_succeeded().await;
        Ok(batch_key)
    }

    /// Finalize the pending batch at the configured fee rate.
    pub async fn finalize_batch(&self) -> Result<Option<MintingBatch>, DashboardError> {
        let request = FinalizeBatchRequest {
            short_response: false,
            fee_rate: self.inner.config.finalize_fee_rate,
        };
        let result: Result<_, DashboardError> = async {
            self.require_connected().await?;
            Ok(self.inner.node.mint().finalize_batch(&request).await?)
        }
        .await;
        let response = self.report(FeedbackSlot::Batch, result).await?;

        let message = match response.batch.as_ref().map(|b| b.batch_txid.as_str()) {
            Some(txid) if !txid.is_empty() => format!("Batch finalized in transaction {}", txid),
            _ => "Batch finalized".to_string(),
        };
        info!("{}", message);
        self.set_feedback(FeedbackSlot::Batch, Feedback::Success(message)).await;
        self.on_batch_finalized().await;
        Ok(response.batch)
    }

    /// Cancel the pending batch. Returns the hex key of the cancelled batch.
    pub async fn cancel_batch(&self) -> Result<String, DashboardError> {
        let result: Result<_, DashboardError> = async {
            self.require_connected().await?;
            Ok(self.inner.node.mint().cancel_batch(&CancelBatchRequest {}).await?)
        }
        .await;
        let response = self.report(FeedbackSlot::Batch, result).await?;

        let batch_key = base64_to_hex(&response.batch_key).unwrap_or_default();
        info!("Cancelled batch {}", batch_key);
        self.set_feedback(FeedbackSlot::Batch, Feedback::Success("Batch cancelled".to_string()))
            .await;
        self.on_batch_cancelled().await;
        Ok(batch_key)
    }

    /// Open an asset channel to a peer.
    pub async fn fund_channel(
        &self,
        form: FundChannelForm,
    ) -> Result<FundChannelResponse, DashboardError> {
        self.inner.state.write().await.fund_form = form.clone();
        let result: Result<_, DashboardError> = async {
            let request = build_fund_channel_request(&form)?;
            self.require_connected().await?;
            Ok(self.inner.node.tap_channels().fund_channel(&request).await?)
        }
        .await;
        let response = self.report(FeedbackSlot::Fund, result).await?;

        let message = if response.txid.is_empty() {
            "Channel funding initiated".to_string()
        } else {
            format!("Channel funding transaction {} published", response.txid)
        };
        info!("{}", message);
        let mut state = self.inner.state.write().await;
        state.fund_form = FundChannelForm::default();
        state.fund_feedback = Feedback::Success(message);
        Ok(response)
    }

    /// Connect to a peer given as `pubkey@host:port`.
    pub async fn connect_peer(&self, address: &str) -> Result<(), DashboardError> {
        self.inner.state.write().await.peer_address = address.to_string();
        let result: Result<(), DashboardError> = async {
            let addr = LightningAddress::parse(address).map_err(ValidationError::from)?;
            self.require_connected().await?;
            let request = ConnectPeerRequest { addr, perm: false };
            self.inner.node.lightning().connect_peer(&request).await?;
            Ok(())
        }
        .await;
        self.report(FeedbackSlot::Peer, result).await?;

        info!("Connected to peer {}", address.trim());
        {
            let mut state = self.inner.state.write().await;
            state.peer_address.clear();
            state.peer_feedback = Feedback::Success("Peer connected".to_string());
        }
        self.on_peer_connected().await;
        Ok(())
    }

    pub async fn on_mint_succeeded(&self) {
        self.fetch_batches().await;
    }

    pub async fn on_batch_finalized(&self) {
        tokio::join!(self.fetch_batches(), self.fetch_assets());
    }

    pub async fn on_batch_cancelled(&self) {
        self.fetch_batches().await;
    }

    pub async fn on_peer_connected(&self) {
        self.fetch_peers().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DashboardConfig;
    use crate::test_support::{connected_dashboard, dashboard};
    use tap_schema::{AssetType, BatchState};

    fn mint_form(name: &str, amount: &str, metadata: MintMetadata) -> MintForm {
        MintForm {
            name: name.to_string(),
            amount: amount.to_string(),
            asset_type: AssetType::Normal,
            metadata,
        }
    }

    #[test]
    fn test_mint_request_shape() {
        let form = mint_form("MyToken", "100", MintMetadata::Text("desc".to_string()));
        let request = build_mint_request(&form).unwrap();
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["asset"]["name"], "MyToken");
        assert_eq!(json["asset"]["amount"], "100");
        assert_eq!(json["asset"]["asset_type"], 0);
        assert_eq!(json["asset"]["asset_version"], 0);
        assert_eq!(json["asset"]["asset_meta"]["data"], "ZGVzYw==");
        assert_eq!(json["asset"]["asset_meta"]["type"], 0);
        assert_eq!(json["short_response"], false);
    }

    #[test]
    fn test_mint_validation() {
        let err = build_mint_request(&mint_form(" \n ", "1", MintMetadata::None)).unwrap_err();
        assert_eq!(err, ValidationError::MissingName);
        for amount in ["", "0", "-3", "1.5", "ten"] {
            let err = build_mint_request(&mint_form("x", amount, MintMetadata::None)).unwrap_err();
            assert_eq!(err, ValidationError::NotPositiveInteger("Amount"));
        }

        let request = build_mint_request(&mint_form("My\nToken ", "7", MintMetadata::None)).unwrap();
        assert_eq!(request.asset.name, "MyToken");
        assert_eq!(request.asset.asset_meta.data, "");
    }

    #[test]
    fn test_collectible_file_becomes_data_uri() {
        let form = MintForm {
            name: "art".to_string(),
            amount: "1".to_string(),
            asset_type: AssetType::Collectible,
            metadata: MintMetadata::File {
                file_name: "cat.PNG".to_string(),
                bytes: vec![1, 2, 3],
            },
        };
        let request = build_mint_request(&form).unwrap();
        assert_eq!(request.asset.asset_type, AssetType::Collectible);
        assert_eq!(
            request.asset.asset_meta.decode_text().unwrap().as_deref(),
            Some("data:image/png;base64,AQID")
        );
    }

    #[test]
    fn test_fund_channel_request() {
        let form = FundChannelForm {
            asset_id: "deadbeef".to_string(),
            amount: "500".to_string(),
            fee_rate: "4".to_string(),
            peer_pubkey: "cafebabe".to_string(),
        };
        let request = build_fund_channel_request(&form).unwrap();
        assert_eq!(request.asset_id, "3q2-7w==");
        assert_eq!(request.peer_pubkey, "yv66vg==");
        assert_eq!(request.asset_amount, 500);
        assert_eq!(request.fee_rate_sat_per_vbyte, 4);

        let bad = FundChannelForm {
            fee_rate: "0".to_string(),
            ..form.clone()
        };
        assert_eq!(
            build_fund_channel_request(&bad).unwrap_err(),
            ValidationError::NotPositiveInteger("Fee rate")
        );
        let bad = FundChannelForm {
            peer_pubkey: "xyz".to_string(),
            ..form
        };
        assert_eq!(
            build_fund_channel_request(&bad).unwrap_err(),
            ValidationError::InvalidHex("peer_pubkey")
        );
    }

    #[tokio::test]
    async fn test_mint_success_resets_form_and_refetches_batches_once() {
        let (dashboard, node) = connected_dashboard().await;
        let listings = node.call_count("list_batches");

        let form = mint_form("MyToken", "100", MintMetadata::Text("desc".to_string()));
        let batch_key = dashboard.mint_asset(form).await.unwrap();

        assert_eq!(node.call_count("list_batches"), listings + 1);
        let state = dashboard.snapshot().await;
        assert_eq!(state.mint_form, MintForm::default());
        assert_eq!(
            state.mint_feedback,
            Feedback::Success(format!("Asset added to batch {}", batch_key))
        );
        assert_eq!(state.pending_batch.len(), 1);
        assert_eq!(state.pending_batch[0].batch_key, batch_key);
        assert_eq!(state.pending_batch[0].decoded_meta.as_deref(), Some("desc"));

        let sent = &node.mint_requests()[0];
        assert_eq!(sent.asset.amount, 100);
        assert_eq!(sent.asset.asset_meta.data, "ZGVzYw==");
    }

    #[tokio::test]
    async fn test_mint_failure_keeps_form() {
        let (dashboard, node) = connected_dashboard().await;
        node.fail("mint_asset");
        let form = mint_form("MyToken", "100", MintMetadata::None);

        assert!(dashboard.mint_asset(form.clone()).await.is_err());
        let state = dashboard.snapshot().await;
        assert_eq!(state.mint_form, form);
        assert!(matches!(state.mint_feedback, Feedback::Error(_)));
        assert!(state.pending_batch.is_empty());
    }

    #[tokio::test]
    async fn test_mutations_require_connection() {
        let (dashboard, node) = dashboard(DashboardConfig::default());
        dashboard.init().await.unwrap();

        let err = dashboard
            .mint_asset(mint_form("x", "1", MintMetadata::None))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotConnected));
        assert_eq!(
            dashboard.snapshot().await.mint_feedback,
            Feedback::Error("not connected to a node".to_string())
        );
        assert!(matches!(
            dashboard.finalize_batch().await,
            Err(DashboardError::NotConnected)
        ));
        assert_eq!(node.call_count("mint_asset"), 0);
        assert_eq!(node.call_count("finalize_batch"), 0);
    }

    #[tokio::test]
    async fn test_finalize_refetches_batches_and_assets() {
        let (dashboard, node) = connected_dashboard().await;
        dashboard
            .mint_asset(mint_form("MyToken", "100", MintMetadata::None))
            .await
            .unwrap();
        let batches = node.call_count("list_batches");
        let assets = node.call_count("list_assets");

        let batch = dashboard.finalize_batch().await.unwrap().unwrap();
        assert_eq!(batch.state, BatchState::Broadcast);
        assert_eq!(node.finalize_requests()[0].fee_rate, 10);
        assert_eq!(node.call_count("list_batches"), batches + 1);
        assert_eq!(node.call_count("list_assets"), assets + 1);

        let state = dashboard.snapshot().await;
        assert!(state.pending_batch.is_empty());
        assert!(state.assets.iter().any(|a| a.name() == "MyToken"));
    }

    #[tokio::test]
    async fn test_failed_finalize_keeps_drafts() {
        let (dashboard, node) = connected_dashboard().await;
        dashboard
            .mint_asset(mint_form("MyToken", "100", MintMetadata::None))
            .await
            .unwrap();
        node.fail("finalize_batch");

        assert!(dashboard.finalize_batch().await.is_err());
        assert_eq!(dashboard.pending_batch().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_batch() {
        let (dashboard, node) = connected_dashboard().await;
        let batch_key = dashboard
            .mint_asset(mint_form("MyToken", "100", MintMetadata::None))
            .await
            .unwrap();

        assert_eq!(dashboard.cancel_batch().await.unwrap(), batch_key);
        assert!(dashboard.pending_batch().await.is_empty());
        assert_eq!(
            dashboard.snapshot().await.batch_feedback,
            Feedback::Success("Batch cancelled".to_string())
        );
        assert_eq!(node.call_count("cancel_batch"), 1);
    }

    #[tokio::test]
    async fn test_fund_channel_success_clears_form() {
        let (dashboard, node) = connected_dashboard().await;
        let form = FundChannelForm {
            asset_id: "deadbeef".to_string(),
            amount: "500".to_string(),
            fee_rate: "4".to_string(),
            peer_pubkey: "cafebabe".to_string(),
        };
        let response = dashboard.fund_channel(form).await.unwrap();

        let sent = &node.fund_requests()[0];
        assert_eq!(sent.asset_id, "3q2-7w==");
        assert_eq!(sent.peer_pubkey, "yv66vg==");
        let state = dashboard.snapshot().await;
        assert_eq!(state.fund_form, FundChannelForm::default());
        assert_eq!(
            state.fund_feedback,
            Feedback::Success(format!("Channel funding transaction {} published", response.txid))
        );
    }

    #[tokio::test]
    async fn test_fund_channel_validation_keeps_form() {
        let (dashboard, node) = connected_dashboard().await;
        let form = FundChannelForm {
            asset_id: String::new(),
            amount: "500".to_string(),
            fee_rate: "4".to_string(),
            peer_pubkey: "cafebabe".to_string(),
        };
        let err = dashboard.fund_channel(form.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Validation(ValidationError::Missing("asset_id"))
        ));
        assert_eq!(dashboard.snapshot().await.fund_form, form);
        assert_eq!(node.call_count("fund_channel"), 0);
    }

    #[tokio::test]
    async fn test_connect_peer() {
        let (dashboard, node) = connected_dashboard().await;
        let err = dashboard.connect_peer("no-at-sign").await.unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Validation(ValidationError::InvalidPeerAddress)
        ));
        assert_eq!(dashboard.snapshot().await.peer_address, "no-at-sign");

        let before = dashboard.peers().await.len();
        dashboard.connect_peer("03abcd@10.0.0.2:9735").await.unwrap();
        let sent = &node.peer_requests()[0];
        assert_eq!(sent.addr.pubkey, "03abcd");
        assert_eq!(sent.addr.host, "10.0.0.2:9735");
        assert!(!sent.perm);

        let state = dashboard.snapshot().await;
        assert_eq!(state.peers.len(), before + 1);
        assert!(state.peer_address.is_empty());
    }
}
