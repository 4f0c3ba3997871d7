//! # HTTP API
//!
//! Builds the axum router that exposes the node's HTTP interface. The same
//! routes are what [`HttpNetworkClient`](graymatter_protocol::network::HttpNetworkClient)
//! calls on other nodes, so the shapes here are the wire protocol.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                           |
//! |--------|-----------------------------|---------------------------------------|
//! | GET    | `/health`                   | Liveness probe                        |
//! | GET    | `/status`                   | `{"node": {address, type}}`           |
//! | GET    | `/blockchain`               | Paged chain read                      |
//! | GET    | `/blockchain/block/:hash`   | Block by hash                         |
//! | POST   | `/blockchain/block`         | Offer a block from a peer             |
//! | GET    | `/network`                  | `{"peers": [...]}`                    |
//! | POST   | `/network/node`             | Announce a peer (`?broadcast=bool`)   |
//! | POST   | `/article`                  | Submit a signed article               |
//! | POST   | `/util/crypto/key-pair`     | Generate a publisher keypair          |
//! | POST   | `/util/crypto/sign`         | Sign data with a hex secret key       |
//! | POST   | `/util/crypto/verify`       | Verify a hex signature                |
//!
//! Utility nodes hold no chain and mount only `/health`, `/status`, and
//! `/util/*`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use graymatter_protocol::crypto::{sign_hex, verify_hex, KeyError, Keypair};
use graymatter_protocol::ledger::{Article, Block, ChainQuery, Ledger, LedgerError};
use graymatter_protocol::network::{Node, NodeInfo, PeerDirectory, PeerList};
use graymatter_protocol::storage::SortOrder;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// State every node has, chain or not.
///
/// Cheap to clone, everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Who this node is, as served from `/status`.
    pub info: NodeInfo,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// State for the chain and network routes. Absent on utility nodes.
#[derive(Clone)]
pub struct LedgerState {
    pub info: NodeInfo,
    pub metrics: SharedMetrics,
    pub ledger: Arc<Ledger>,
    pub directory: Arc<PeerDirectory>,
}

impl LedgerState {
    fn observe(&self) {
        self.metrics.observe(&self.ledger, &self.directory);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Every way a handler can fail, and the status code it maps to.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidPageSize => Self::BadRequest(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Generation(_) => Self::Internal(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with CORS and request tracing.
///
/// `ledger` is `None` for utility nodes, which then serve only the health,
/// status, and crypto helper routes.
pub fn create_router(state: AppState, ledger: Option<LedgerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/util/crypto/key-pair", post(key_pair_handler))
        .route("/util/crypto/sign", post(sign_handler))
        .route("/util/crypto/verify", post(verify_handler))
        .with_state(state);

    if let Some(ledger) = ledger {
        router = router.merge(ledger_routes(ledger));
    }

    router.layer(cors).layer(TraceLayer::new_for_http())
}

fn ledger_routes(state: LedgerState) -> Router {
    Router::new()
        .route("/blockchain", get(chain_handler))
        .route("/blockchain/block", post(submit_block_handler))
        .route("/blockchain/block/:hash", get(block_by_hash_handler))
        .route("/network", get(peers_handler))
        .route("/network/node", post(add_peer_handler))
        .route("/article", post(article_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Query string of `GET /blockchain`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
    /// `ASC` or `DESC`, any case.
    pub sort: Option<String>,
    pub from_height: Option<u64>,
}

impl ChainParams {
    fn into_query(self) -> ApiResult<ChainQuery> {
        let page = self
            .page
            .ok_or_else(|| ApiError::BadRequest("query parameter `page` is required".into()))?;
        if page < 0 {
            return Err(ApiError::BadRequest("`page` must not be negative".into()));
        }
        let size = match self.size {
            None => ChainQuery::default().size,
            Some(size) if size >= 1 => usize::try_from(size)
                .map_err(|_| ApiError::BadRequest("`size` is too large".into()))?,
            Some(_) => return Err(ApiError::BadRequest("`size` must be at least 1".into())),
        };
        let sort = match self.sort.as_deref() {
            None => SortOrder::default(),
            Some(sort) => sort.parse::<SortOrder>().map_err(ApiError::BadRequest)?,
        };
        Ok(ChainQuery {
            page,
            size,
            sort,
            from_height: self.from_height,
        })
    }
}

/// Query string of `POST /network/node`.
#[derive(Debug, Default, Deserialize)]
pub struct BroadcastParam {
    #[serde(default)]
    pub broadcast: bool,
}

/// Response of `POST /util/crypto/key-pair`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairResponse {
    pub private_key: String,
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub private_key: String,
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignResponse {
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub public_key: String,
    pub data: String,
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

/// Response of `POST /article` when the article was buffered but did not
/// complete a block.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArticleAccepted {
    pub id: String,
    pub pending: usize,
}

// ---------------------------------------------------------------------------
// Node Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
///
/// This is the liveness probe for orchestrators. It does not look at the
/// chain or the peers.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: this node's identity.
async fn status_handler(State(state): State<AppState>) -> Json<NodeInfo> {
    Json(state.info.clone())
}

// ---------------------------------------------------------------------------
// Crypto Helpers
// ---------------------------------------------------------------------------

/// `POST /util/crypto/key-pair`: mint a fresh Ed25519 keypair.
async fn key_pair_handler() -> ApiResult<(StatusCode, Json<KeyPairResponse>)> {
    let keypair = Keypair::generate()?;
    Ok((
        StatusCode::CREATED,
        Json(KeyPairResponse {
            private_key: keypair.secret_key_hex(),
            public_key: keypair.public_key().to_hex(),
        }),
    ))
}

/// `POST /util/crypto/sign`: sign `data` with a hex secret key.
async fn sign_handler(
    body: Result<Json<SignRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SignResponse>)> {
    let Json(req) = body?;
    let signature = sign_hex(&req.private_key, req.data.as_bytes())?;
    Ok((StatusCode::CREATED, Json(SignResponse { signature })))
}

/// `POST /util/crypto/verify`: check a hex signature over `data`.
async fn verify_handler(
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Json<VerifyResponse>> {
    let Json(req) = body?;
    let valid = verify_hex(&req.public_key, req.data.as_bytes(), &req.signature)?;
    Ok(Json(VerifyResponse { valid }))
}

// ---------------------------------------------------------------------------
// Chain Handlers
// ---------------------------------------------------------------------------

/// `GET /blockchain?page=&size=&sort=&fromHeight=`: one page of blocks.
async fn chain_handler(
    State(state): State<LedgerState>,
    params: Result<Query<ChainParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Block>>> {
    let Query(params) = params?;
    let blocks = state.ledger.chain(params.into_query()?)?;
    Ok(Json(blocks))
}

/// `GET /blockchain/block/:hash`: block by hash.
async fn block_by_hash_handler(
    State(state): State<LedgerState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<Block>> {
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(ApiError::BadRequest("block hash must not be blank".into()));
    }
    state
        .ledger
        .get_block(hash)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no block with hash {hash}")))
}

/// `POST /blockchain/block`: a peer offers a block.
///
/// Accepted blocks are not re-broadcast: the minting node already pushed to
/// every peer it knows.
async fn submit_block_handler(
    State(state): State<LedgerState>,
    body: Result<Json<Block>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(block) = body?;
    let accepted = state.ledger.process_block(&block)?;
    state.observe();
    if accepted {
        state.metrics.blocks_accepted_total.inc();
        Ok(StatusCode::CREATED)
    } else {
        state.metrics.blocks_rejected_total.inc();
        Err(ApiError::BadRequest(format!(
            "block {} at height {} was rejected",
            block.hash(),
            block.height()
        )))
    }
}

// ---------------------------------------------------------------------------
// Network Handlers
// ---------------------------------------------------------------------------

/// `GET /network`: known peers in discovery order.
async fn peers_handler(State(state): State<LedgerState>) -> Json<PeerList> {
    Json(PeerList {
        peers: state.directory.peers(),
    })
}

/// `POST /network/node?broadcast=bool`: learn about a peer.
///
/// A duplicate is still a 201; the directory simply ignores it.
async fn add_peer_handler(
    State(state): State<LedgerState>,
    params: Result<Query<BroadcastParam>, QueryRejection>,
    body: Result<Json<Node>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Query(params) = params?;
    let Json(node) = body?;
    state
        .directory
        .add_peer(node, params.broadcast)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.observe();
    Ok(StatusCode::CREATED)
}

// ---------------------------------------------------------------------------
// Article Handler
// ---------------------------------------------------------------------------

/// `POST /article`: submit a signed article.
///
/// 200 when buffered, 201 with the new block when this article completed
/// one. The new block is pushed to every peer in the background.
async fn article_handler(
    State(state): State<LedgerState>,
    body: Result<Json<Article>, JsonRejection>,
) -> ApiResult<Response> {
    if !state.info.node.node_type.can_author() {
        return Err(ApiError::Forbidden(format!(
            "{} nodes do not accept articles",
            state.info.node.node_type
        )));
    }
    let Json(article) = body?;
    let id = article.id();

    let outcome = state.ledger.process_article(article)?;
    state.observe();

    if !outcome.accepted {
        state.metrics.articles_rejected_total.inc();
        let reason = outcome
            .rejection
            .map(|r| r.to_string())
            .unwrap_or_else(|| "article rejected".into());
        return Err(ApiError::BadRequest(reason));
    }
    state.metrics.articles_accepted_total.inc();

    match outcome.minted {
        Some(block) => {
            state.metrics.blocks_minted_total.inc();
            // Fire-and-forget; failures are logged by the fan-out.
            let _ = state.directory.broadcast_block(&block);
            Ok((StatusCode::CREATED, Json(block)).into_response())
        }
        None => {
            let pending = state.ledger.pending_count();
            Ok((StatusCode::OK, Json(ArticleAccepted { id, pending })).into_response())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
