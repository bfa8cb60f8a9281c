//! Document registry endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use docreg_crypto::{registration_digest, transfer_digest};
use docreg_types::{AccountId, DocumentRecord, Fingerprint};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{authenticate, claim_once, SignedEnvelope};
use crate::server::{run_blocking, ApiError, SharedState};

/// POST /documents body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterRequest {
    /// 64 hex characters, optional `0x` prefix.
    pub fingerprint: String,
    pub metadata: String,
    #[serde(default)]
    pub storage_pointer: String,
    #[serde(flatten)]
    pub auth: SignedEnvelope,
}

/// POST /documents/:fingerprint/transfer body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferRequest {
    pub new_owner: String,
    #[serde(flatten)]
    pub auth: SignedEnvelope,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<DocumentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentsResponse {
    pub documents: Vec<DocumentRecord>,
    /// Total records in the registry, independent of paging.
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OwnedDocumentsResponse {
    pub owner: AccountId,
    pub documents: Vec<DocumentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub fingerprint: Fingerprint,
    pub previous_owner: AccountId,
    pub new_owner: AccountId,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn parse_fingerprint(value: &str) -> Result<Fingerprint, ApiError> {
    Fingerprint::from_hex(value)
        .map_err(|err| ApiError::bad_request("invalid_fingerprint", err.to_string()))
}

fn parse_account(value: &str, kind: &'static str) -> Result<AccountId, ApiError> {
    AccountId::from_hex(value).map_err(|err| ApiError::bad_request(kind, err.to_string()))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request("invalid_body", rejection.body_text()))
}

/// POST /documents - Register a fingerprint to the signing caller
pub async fn handle_register(
    State(state): State<SharedState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    state.record_request();
    let request = json_body(payload)?;
    let fingerprint = parse_fingerprint(&request.fingerprint)?;

    let caller = authenticate(&state, &request.auth, |issued_at| {
        registration_digest(
            &fingerprint,
            &request.metadata,
            &request.storage_pointer,
            issued_at,
        )
    })?
    .caller;

    let RegisterRequest {
        metadata,
        storage_pointer,
        ..
    } = request;
    let record = run_blocking(&state, move |registry| {
        registry.register(fingerprint, metadata, storage_pointer, caller)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /documents/:fingerprint - Look up a registration
pub async fn handle_get_document(
    State(state): State<SharedState>,
    AxumPath(fingerprint): AxumPath<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    state.record_request();
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let record = run_blocking(&state, move |registry| registry.verify(&fingerprint)).await?;

    Ok(Json(VerifyResponse {
        registered: record.is_some(),
        record,
    }))
}

/// GET /documents - Enumerate registrations, oldest first
pub async fn handle_list_documents(
    State(state): State<SharedState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<DocumentsResponse>, ApiError> {
    state.record_request();
    let (documents, total) = run_blocking(&state, move |registry| {
        let documents = match (page.offset, page.limit) {
            (None, None) => registry.list_all()?,
            (offset, limit) => {
                registry.list_page(offset.unwrap_or(0), limit.unwrap_or(usize::MAX))?
            }
        };
        Ok((documents, registry.count()?))
    })
    .await?;

    Ok(Json(DocumentsResponse { documents, total }))
}

/// GET /owners/:owner/documents - Documents currently held by an account
pub async fn handle_list_owned(
    State(state): State<SharedState>,
    AxumPath(owner): AxumPath<String>,
) -> Result<Json<OwnedDocumentsResponse>, ApiError> {
    state.record_request();
    let owner = parse_account(&owner, "invalid_owner")?;
    let documents = run_blocking(&state, move |registry| registry.list_by_owner(&owner)).await?;

    Ok(Json(OwnedDocumentsResponse { owner, documents }))
}

/// POST /documents/:fingerprint/transfer - Hand a document to a new owner
pub async fn handle_transfer(
    State(state): State<SharedState>,
    AxumPath(fingerprint): AxumPath<String>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    state.record_request();
    let request = json_body(payload)?;
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let new_owner = parse_account(&request.new_owner, "invalid_new_owner")?;

    let verified = authenticate(&state, &request.auth, |issued_at| {
        transfer_digest(&fingerprint, &new_owner, issued_at)
    })?;
    claim_once(&state, &verified)?;
    let caller = verified.caller;

    run_blocking(&state, move |registry| {
        registry.transfer_ownership(fingerprint, new_owner, caller)
    })
    .await?;
    debug!(%fingerprint, "transfer accepted over RPC");

    // The registry only lets the current owner transfer, so the
    // authenticated caller was the previous owner.
    Ok(Json(TransferResponse {
        fingerprint,
        previous_owner: caller,
        new_owner,
    }))
}
