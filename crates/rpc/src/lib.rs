//! HTTP API for the document registry.
//!
//! Reads are open. Registration and transfer requests are signed by the
//! caller's Ed25519 key; see [`auth`].

pub mod auth;
pub mod documents;
pub mod server;

pub use auth::{ReplayGuard, SignedEnvelope, VerifiedRequest};
pub use documents::{
    DocumentsResponse, OwnedDocumentsResponse, RegisterRequest, TransferRequest,
    TransferResponse, VerifyResponse,
};
pub use server::{build_router, start_server, ApiError, AppState, DEFAULT_MAX_CLOCK_SKEW_SECS};
