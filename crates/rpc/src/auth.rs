//! Signed-request authentication.
//!
//! Mutating requests name their `caller` (an Ed25519 public key), the unix
//! second they were `issued_at`, and a signature over a domain-tagged digest
//! of the request fields. A request is accepted when the signature verifies
//! for `caller` and `issued_at` is within the configured skew of server time.
//!
//! Transfers are additionally single-use: [`claim_once`] records each
//! accepted `(caller, digest)` pair until it would fail the freshness check
//! anyway, and refuses anything issued before the node started.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use docreg_crypto::{decode_signature, verify_signature, SignatureError};
use docreg_types::AccountId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::server::{ApiError, AppState};

/// Authentication fields shared by every signed request body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignedEnvelope {
    pub caller: String,
    pub issued_at: u64,
    pub signature: String,
}

/// A request whose signature and timestamp checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedRequest {
    pub caller: AccountId,
    pub issued_at: u64,
    pub digest: [u8; 32],
}

/// Parse and check the envelope against `digest`.
///
/// `digest` receives the parsed `issued_at` so the caller cannot be
/// authenticated for a different timestamp than it signed.
pub fn authenticate(
    state: &AppState,
    envelope: &SignedEnvelope,
    digest: impl FnOnce(u64) -> [u8; 32],
) -> Result<VerifiedRequest, ApiError> {
    let caller = AccountId::from_hex(&envelope.caller)
        .map_err(|err| ApiError::bad_request("invalid_caller", err.to_string()))?;

    check_freshness(state, envelope.issued_at)?;

    let signature = decode_signature(&envelope.signature).map_err(signature_error)?;
    let digest = digest(envelope.issued_at);
    verify_signature(&caller, &digest, &signature).map_err(|err| {
        debug!(%caller, "signature rejected: {err}");
        signature_error(err)
    })?;

    Ok(VerifiedRequest {
        caller,
        issued_at: envelope.issued_at,
        digest,
    })
}

/// Signed requests already accepted by this node.
#[derive(Debug)]
pub struct ReplayGuard {
    not_before: u64,
    /// `(caller, digest)` → last second at which the request is still fresh.
    seen: Mutex<HashMap<(AccountId, [u8; 32]), u64>>,
}

impl ReplayGuard {
    /// Guard that refuses requests issued before `not_before`.
    pub fn new(not_before: u64) -> Self {
        Self {
            not_before,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn not_before(&self) -> u64 {
        self.not_before
    }

    /// Mark `(caller, digest)` as used until `expires_at`.
    ///
    /// Returns false if the pair was already claimed and has not expired.
    pub fn claim(&self, caller: AccountId, digest: [u8; 32], expires_at: u64, now: u64) -> bool {
        let mut seen = self.seen.lock();
        seen.retain(|_, expiry| *expiry >= now);
        match seen.entry((caller, digest)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    /// Requests currently remembered.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accept `request` at most once on this node.
pub fn claim_once(state: &AppState, request: &VerifiedRequest) -> Result<(), ApiError> {
    let guard = &state.replay_guard;
    if request.issued_at < guard.not_before() {
        return Err(ApiError::unauthenticated(
            "stale_request",
            format!(
                "issued_at {} predates node start at {}",
                request.issued_at,
                guard.not_before()
            ),
        ));
    }

    let expires_at = request.issued_at.saturating_add(state.max_clock_skew_secs);
    if !guard.claim(request.caller, request.digest, expires_at, state.clock.now()) {
        warn!(caller = %request.caller, "replayed signed request refused");
        return Err(ApiError::unauthenticated(
            "replayed_request",
            "this signed request has already been accepted",
        ));
    }
    Ok(())
}

fn check_freshness(state: &AppState, issued_at: u64) -> Result<(), ApiError> {
    let now = state.clock.now();
    let skew = now.abs_diff(issued_at);
    if skew > state.max_clock_skew_secs {
        return Err(ApiError::unauthenticated(
            "stale_request",
            format!(
                "issued_at {issued_at} is {skew}s from server time {now} (max {}s)",
                state.max_clock_skew_secs
            ),
        ));
    }
    Ok(())
}

fn signature_error(err: SignatureError) -> ApiError {
    ApiError::unauthenticated("invalid_signature", err.to_string())
}
