//! HTTP API for the dashboard.

use crate::controller::Dashboard;
use crate::error::DashboardError;
use crate::state::{
    ConnectionState, DraftAsset, Feedback, FundChannelForm, MintForm, MintMetadata, Session,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lnc_adapter::Credentials;
use serde::{Deserialize, Serialize};
use tap_schema::encoding::decode_bytes;
use tap_schema::{Asset, AssetType, Channel, MintingBatch, NodeInfo, Peer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the API router.
pub fn create_router(dashboard: Dashboard) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/node", get(get_node))
        .route("/channels", get(get_channels))
        .route("/assets", get(get_assets))
        .route("/batch", get(get_batch))
        .route("/peers", get(get_peers))
        .route("/connect", post(connect))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
        .route("/mint", post(mint))
        .route("/batch/finalize", post(finalize_batch))
        .route("/batch/cancel", post(cancel_batch))
        .route("/channels/fund", post(fund_channel))
        .route("/peers/connect", post(connect_peer))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(dashboard)
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    state: ConnectionState,
    generation: u64,
    session: Option<Session>,
}

#[derive(Serialize)]
struct BatchResponse {
    assets: Vec<DraftAsset>,
    feedback: Feedback,
}

#[derive(Serialize)]
struct MintResponse {
    batch_key: String,
}

#[derive(Serialize)]
struct FinalizeResponse {
    batch: Option<MintingBatch>,
}

#[derive(Serialize)]
struct CancelResponse {
    batch_key: String,
}

#[derive(Serialize)]
struct FundResponse {
    txid: String,
    output_index: i32,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// Request bodies

#[derive(Deserialize)]
struct ConnectRequest {
    pairing_phrase: String,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

/// A form number sent either as JSON number or as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum FormNumber {
    Number(u64),
    Text(String),
}

impl FormNumber {
    fn into_text(self) -> String {
        match self {
            FormNumber::Number(n) => n.to_string(),
            FormNumber::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct MintBody {
    name: String,
    amount: FormNumber,
    #[serde(default)]
    collectible: bool,
    #[serde(default)]
    meta: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    /// File content, base64.
    #[serde(default)]
    file: Option<String>,
}

#[derive(Deserialize)]
struct FundBody {
    asset_id: String,
    amount: FormNumber,
    fee_rate: FormNumber,
    peer_pubkey: String,
}

#[derive(Deserialize)]
struct PeerBody {
    address: String,
}

// Handlers

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_status(State(dashboard): State<Dashboard>) -> Json<StatusResponse> {
    let state = dashboard.snapshot().await;
    Json(StatusResponse {
        state: state.connection,
        generation: state.generation,
        session: state.session,
    })
}

async fn get_node(State(dashboard): State<Dashboard>) -> Json<Option<NodeInfo>> {
    Json(dashboard.node_info().await)
}

async fn get_channels(State(dashboard): State<Dashboard>) -> Json<Vec<Channel>> {
    Json(dashboard.channels().await)
}

async fn get_assets(State(dashboard): State<Dashboard>) -> Json<Vec<Asset>> {
    Json(dashboard.assets().await)
}

async fn get_batch(State(dashboard): State<Dashboard>) -> Json<BatchResponse> {
    let state = dashboard.snapshot().await;
    Json(BatchResponse {
        assets: state.pending_batch,
        feedback: state.batch_feedback,
    })
}

async fn get_peers(State(dashboard): State<Dashboard>) -> Json<Vec<Peer>> {
    Json(dashboard.peers().await)
}

async fn connect(
    State(dashboard): State<Dashboard>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let credentials = Credentials {
        pairing_phrase: body.pairing_phrase,
        password: body.password,
    };
    dashboard.connect(credentials).await.map_err(error_response)?;
    Ok(get_status(State(dashboard)).await)
}

async fn login(
    State(dashboard): State<Dashboard>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    dashboard.login(&body.password).await.map_err(error_response)?;
    Ok(get_status(State(dashboard)).await)
}

async fn logout(State(dashboard): State<Dashboard>) -> Result<Json<StatusResponse>, ApiError> {
    dashboard.logout().await.map_err(error_response)?;
    Ok(get_status(State(dashboard)).await)
}

async fn refresh(State(dashboard): State<Dashboard>) -> Result<Json<StatusResponse>, ApiError> {
    if dashboard.connection_state().await != ConnectionState::Connected {
        return Err(error_response(DashboardError::NotConnected));
    }
    dashboard.refresh_all().await;
    Ok(get_status(State(dashboard)).await)
}

async fn mint(
    State(dashboard): State<Dashboard>,
    Json(body): Json<MintBody>,
) -> Result<Json<MintResponse>, ApiError> {
    let metadata = match (body.file, body.meta) {
        (Some(file), _) => {
            let bytes = decode_bytes(&file)
                .map_err(|e| bad_request(format!("file must be base64: {}", e)))?;
            MintMetadata::File {
                file_name: body.file_name.unwrap_or_default(),
                bytes,
            }
        }
        (None, Some(text)) => MintMetadata::Text(text),
        (None, None) => MintMetadata::None,
    };
    let form = MintForm {
        name: body.name,
        amount: body.amount.into_text(),
        asset_type: if body.collectible {
            AssetType::Collectible
        } else {
            AssetType::Normal
        },
        metadata,
    };
    let batch_key = dashboard.mint_asset(form).await.map_err(error_response)?;
    Ok(Json(MintResponse { batch_key }))
}

async fn finalize_batch(
    State(dashboard): State<Dashboard>,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let batch = dashboard.finalize_batch().await.map_err(error_response)?;
    Ok(Json(FinalizeResponse { batch }))
}

async fn cancel_batch(
    State(dashboard): State<Dashboard>,
) -> Result<Json<CancelResponse>, ApiError> {
    let batch_key = dashboard.cancel_batch().await.map_err(error_response)?;
    Ok(Json(CancelResponse { batch_key }))
}

async fn fund_channel(
    State(dashboard): State<Dashboard>,
    Json(body): Json<FundBody>,
) -> Result<Json<FundResponse>, ApiError> {
    let form = FundChannelForm {
        asset_id: body.asset_id,
        amount: body.amount.into_text(),
        fee_rate: body.fee_rate.into_text(),
        peer_pubkey: body.peer_pubkey,
    };
    let response = dashboard.fund_channel(form).await.map_err(error_response)?;
    Ok(Json(FundResponse {
        txid: response.txid,
        output_index: response.output_index,
    }))
}

async fn connect_peer(
    State(dashboard): State<Dashboard>,
    Json(body): Json<PeerBody>,
) -> Result<Json<Vec<Peer>>, ApiError> {
    dashboard
        .connect_peer(&body.address)
        .await
        .map_err(error_response)?;
    Ok(Json(dashboard.peers().await))
}

// Helper functions

fn status_for(err: &DashboardError) -> StatusCode {
    match err {
        DashboardError::Validation(_) => StatusCode::BAD_REQUEST,
        DashboardError::InvalidPassword => StatusCode::UNAUTHORIZED,
        DashboardError::NotConnected
        | DashboardError::Busy
        | DashboardError::Superseded
        | DashboardError::NoStoredSession => StatusCode::CONFLICT,
        DashboardError::Connection(_)
        | DashboardError::Node(_)
        | DashboardError::UnexpectedResponse(_) => StatusCode::BAD_GATEWAY,
        DashboardError::Store(_) | DashboardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: DashboardError) -> ApiError {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn bad_request(error: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}
