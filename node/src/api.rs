//! # Operator API
//!
//! Builds the axum router for the hosted roster. All handlers share
//! [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                                | Description                           |
//! |--------|-------------------------------------|---------------------------------------|
//! | GET    | `/health`                           | Liveness check                        |
//! | GET    | `/parties`                          | Hosted parties and the notary         |
//! | GET    | `/parties/:name/balances`           | Unconsumed totals per issuer/currency |
//! | GET    | `/parties/:name/states`             | Unspent records, identities resolved  |
//! | POST   | `/parties/:name/approvals`          | Let an initiator run one flow on us   |
//! | DELETE | `/parties/:name/approvals/:flow_id` | Withdraw that approval                |
//! | POST   | `/flows/issue`                      | Run an Issue flow                     |
//! | POST   | `/flows/move`                       | Run a Move flow                       |
//! | POST   | `/flows/exit`                       | Run an Exit flow                      |
//!
//! Flow requests take an optional `flow_id`. A party other than the
//! initiator only spends its cash, or issues, for a flow id it approved.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use mycash_protocol::crypto::SecureHash;
use mycash_protocol::flows::{FlowError, MyCashData};
use mycash_protocol::identity::{IdentityResolver, Party};
use mycash_protocol::network::NetworkError;
use mycash_protocol::state::{CurrencyCode, StateRef};
use mycash_protocol::transaction::CommittedTransaction;
use mycash_protocol::vault::{CashQuery, SelectionError};

use crate::roster::Roster;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub roster: Arc<Roster>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/parties", get(parties_handler))
        .route("/parties/:name/balances", get(balances_handler))
        .route("/parties/:name/states", get(states_handler))
        .route("/parties/:name/approvals", post(approve_handler))
        .route("/parties/:name/approvals/:flow_id", delete(revoke_handler))
        .route("/flows/issue", post(issue_handler))
        .route("/flows/move", post(move_handler))
        .route("/flows/exit", post(exit_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// One amount of cash, named by party names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashLine {
    pub issuer: String,
    pub owner: String,
    pub amount: u64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    /// Party whose node runs the flow.
    pub initiator: String,
    #[serde(default)]
    pub flow_id: Option<Uuid>,
    pub outputs: Vec<CashLine>,
    #[serde(default)]
    pub anonymous: bool,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub initiator: String,
    #[serde(default)]
    pub flow_id: Option<Uuid>,
    pub requests: Vec<CashLine>,
    pub new_owner: String,
    #[serde(default)]
    pub anonymous: bool,
}

/// A state ref in JSON: hex transaction id plus output index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefBody {
    pub tx_id: String,
    pub index: u32,
}

impl From<&StateRef> for RefBody {
    fn from(reference: &StateRef) -> Self {
        Self {
            tx_id: reference.tx_id.to_hex(),
            index: reference.index,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExitRequest {
    pub initiator: String,
    #[serde(default)]
    pub flow_id: Option<Uuid>,
    pub refs: Vec<RefBody>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub flow_id: Uuid,
    /// Party allowed to run the flow.
    pub initiator: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub approver: String,
    pub flow_id: Uuid,
    pub initiator: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartiesResponse {
    pub notary: String,
    pub parties: Vec<PartyInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartyInfo {
    pub name: String,
    /// Base58 well-known key.
    pub owning_key: String,
    pub unspent_records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Issuer name, or the confidential key when it can't be resolved.
    pub issuer: String,
    pub currency: String,
    pub amount: u64,
    pub records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateResponse {
    pub reference: RefBody,
    pub issuer: String,
    pub owner: String,
    pub amount: u64,
    pub currency: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub tx_id: String,
    pub sequence: u64,
    pub command: String,
    pub consumed: Vec<RefBody>,
    pub produced: Vec<RefBody>,
}

impl From<&CommittedTransaction> for TransactionResponse {
    fn from(committed: &CommittedTransaction) -> Self {
        let wtx = &committed.stx.tx;
        Self {
            tx_id: committed.id().to_hex(),
            sequence: committed.sequence,
            command: wtx.command.value.to_string(),
            consumed: wtx.inputs.iter().map(RefBody::from).collect(),
            produced: wtx
                .output_states()
                .iter()
                .map(|s| RefBody::from(&s.reference))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A handler failure with the status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        let status = match &err {
            FlowError::InvalidRequest(_) | FlowError::State(_) => StatusCode::BAD_REQUEST,
            FlowError::Validation(_)
            | FlowError::Builder(_)
            | FlowError::Selection(SelectionError::InsufficientFunds { .. })
            | FlowError::Selection(SelectionError::ZeroAmount) => StatusCode::UNPROCESSABLE_ENTITY,
            FlowError::Conflict { .. } => StatusCode::CONFLICT,
            FlowError::Rejected { .. }
            | FlowError::NotStakeholder { .. }
            | FlowError::Unauthorised { .. } => StatusCode::FORBIDDEN,
            FlowError::Network(NetworkError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            FlowError::Network(_) | FlowError::Notary(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "request refused");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — 200 while the process is up.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": state.version }))
}

async fn parties_handler(State(state): State<AppState>) -> impl IntoResponse {
    let parties = state
        .roster
        .nodes()
        .map(|node| PartyInfo {
            name: node.identity().name().to_string(),
            owning_key: node.identity().owning_key().to_base58(),
            unspent_records: node.vault().unspent_count(),
        })
        .collect();
    Json(PartiesResponse {
        notary: state.roster.notary().name().to_string(),
        parties,
    })
}

async fn balances_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<BalanceResponse>>, ApiError> {
    let node = state
        .roster
        .node(&name)
        .ok_or_else(|| ApiError::not_found(format!("no party named {name}")))?;
    let identities = node.hub().identities();
    let balances = node.balances().map_err(FlowError::from)?;
    Ok(Json(
        balances
            .into_iter()
            .map(|b| BalanceResponse {
                issuer: identities
                    .well_known_party_from_anonymous(&b.issuer)
                    .map_or_else(|| b.issuer.to_string(), |p| p.name().to_string()),
                currency: b.currency.to_string(),
                amount: b.amount,
                records: b.records,
            })
            .collect(),
    ))
}

async fn states_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<StateResponse>>, ApiError> {
    let node = state
        .roster
        .node(&name)
        .ok_or_else(|| ApiError::not_found(format!("no party named {name}")))?;
    let holdings = node.known_holdings(&CashQuery::default())?;
    Ok(Json(
        holdings
            .iter()
            .map(|h| StateResponse {
                reference: RefBody::from(&h.reference),
                issuer: h.data.issuer.name().to_string(),
                owner: h.data.owner.name().to_string(),
                amount: h.data.amount,
                currency: h.data.currency.to_string(),
            })
            .collect(),
    ))
}

async fn approve_handler(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(req): Json<ApprovalRequest>,
) -> Result<(StatusCode, Json<ApprovalResponse>), ApiError> {
    if state.roster.node(&name).is_none() {
        return Err(ApiError::not_found(format!("no party named {name}")));
    }
    state.roster.approve(&name, req.flow_id, &req.initiator)?;
    Ok((
        StatusCode::CREATED,
        Json(ApprovalResponse {
            approver: name,
            flow_id: req.flow_id,
            initiator: req.initiator,
        }),
    ))
}

async fn revoke_handler(
    Path((name, flow_id)): Path<(String, Uuid)>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    if state.roster.node(&name).is_none() {
        return Err(ApiError::not_found(format!("no party named {name}")));
    }
    if state.roster.revoke_approval(&name, &flow_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("{name} has no approval for {flow_id}")))
    }
}

async fn issue_handler(
    State(state): State<AppState>,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let data = to_cash_data(&state.roster, &req.outputs)?;
    let committed = state
        .roster
        .issue(&req.initiator, req.flow_id, data, req.anonymous)
        .await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&committed))))
}

async fn move_handler(
    State(state): State<AppState>,
    Json(req): Json<MoveRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let data = to_cash_data(&state.roster, &req.requests)?;
    let new_owner = party(&state.roster, &req.new_owner)?;
    let committed = state
        .roster
        .move_cash(&req.initiator, req.flow_id, data, &new_owner, req.anonymous)
        .await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&committed))))
}

async fn exit_handler(
    State(state): State<AppState>,
    Json(req): Json<ExitRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let refs = req
        .refs
        .iter()
        .map(|r| {
            SecureHash::from_hex(&r.tx_id)
                .map(|tx_id| StateRef::new(tx_id, r.index))
                .map_err(|e| ApiError::bad_request(format!("bad tx id {}: {}", r.tx_id, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let committed = state.roster.exit(&req.initiator, req.flow_id, refs).await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&committed))))
}

fn party(roster: &Roster, name: &str) -> Result<Party, ApiError> {
    roster
        .party(name)
        .ok_or_else(|| ApiError::bad_request(format!("no party named {name}")))
}

fn to_cash_data(roster: &Roster, lines: &[CashLine]) -> Result<Vec<MyCashData>, ApiError> {
    lines
        .iter()
        .map(|line| {
            let currency = CurrencyCode::new(&line.currency)
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            Ok(MyCashData::new(
                &party(roster, &line.issuer)?,
                &party(roster, &line.owner)?,
                line.amount,
                currency,
            ))
        })
        .collect()
}
