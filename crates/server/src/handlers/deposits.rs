//! Deposit ingress handlers.
//!
//! The synchronous half of the pipeline: each request delivers one payload
//! part. The part is staged, its MD5 verified against the client-supplied
//! value, and on the final part the deposit is handed to the finalization
//! queue. The receipt is returned immediately; finalization is never
//! awaited here.

use crate::error::{ApiError, ApiResult};
use crate::finalize::FinalizeRequest;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use depot_core::{DepositId, DepositReceipt, DepositState, PackageType, PayloadDigest};
use depot_storage::{StorageError, digest_file};

/// Headers describing one payload part.
#[derive(Debug)]
pub struct PartHeaders {
    /// Payload filename from `Content-Disposition`.
    pub filename: String,
    /// Client-supplied MD5 of the part body.
    pub digest: PayloadDigest,
    /// Accepted content type.
    pub package: PackageType,
    /// Whether more parts will follow.
    pub in_progress: bool,
}

/// Parse the deposit headers of a part request.
pub fn parse_part_headers(headers: &HeaderMap) -> ApiResult<PartHeaders> {
    let filename = headers
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(content_disposition_filename)
        .ok_or_else(|| {
            ApiError::BadRequest("Content-Disposition with a filename is required".to_string())
        })?;

    let digest = headers
        .get("Content-MD5")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-MD5 is required".to_string()))
        .and_then(|v| {
            PayloadDigest::from_hex(v.trim())
                .map_err(|e| ApiError::BadRequest(format!("invalid Content-MD5: {e}")))
        })?;

    let package = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-Type is required".to_string()))
        .and_then(|v| {
            PackageType::from_mime_type(v).map_err(|e| ApiError::BadRequest(e.to_string()))
        })?;

    let in_progress = match headers.get("In-Progress").map(|v| v.to_str()) {
        None => false,
        Some(Ok("true")) => true,
        Some(Ok("false")) => false,
        Some(_) => {
            return Err(ApiError::BadRequest(
                "In-Progress must be \"true\" or \"false\"".to_string(),
            ));
        }
    };

    Ok(PartHeaders {
        filename,
        digest,
        package,
        in_progress,
    })
}

/// Extract the `filename` parameter of a `Content-Disposition` value.
fn content_disposition_filename(value: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let param = param.trim();
        let name = param.strip_prefix("filename=")?;
        let name = name.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// POST /collection - Open a deposit and receive its first part.
#[tracing::instrument(skip(state, req))]
pub async fn create_deposit(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, HeaderMap, Json<DepositReceipt>)> {
    let part = parse_part_headers(req.headers())?;
    let body = read_part_body(&state, req).await?;

    let deposit_id = DepositId::generate();
    tracing::info!(deposit_id = %deposit_id, filename = %part.filename, "deposit opened");

    let receipt = receive_part(&state, &deposit_id, part, body).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = receipt.edit_iri.parse() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(receipt)))
}

/// POST /media/{deposit_id} - Receive a continuation part.
///
/// Only deposits currently in `DRAFT` accept further parts; anything else is
/// refused with 405.
#[tracing::instrument(skip(state, req), fields(deposit_id = %deposit_id))]
pub async fn continue_deposit(
    State(state): State<AppState>,
    Path(deposit_id): Path<String>,
    req: Request,
) -> ApiResult<Json<DepositReceipt>> {
    let deposit_id = DepositId::parse(&deposit_id)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let current = match state.props.get_state(&deposit_id).await {
        Ok(state) => state,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!(
                "no such deposit: {deposit_id}"
            )));
        }
        Err(e) => return Err(e.into()),
    };
    if current != DepositState::Draft {
        return Err(ApiError::MethodNotAllowed(format!(
            "deposit {deposit_id} is {current}; continuation requires DRAFT"
        )));
    }

    let part = parse_part_headers(req.headers())?;
    let body = read_part_body(&state, req).await?;
    let receipt = receive_part(&state, &deposit_id, part, body).await?;
    Ok(Json(receipt))
}

async fn read_part_body(state: &AppState, req: Request) -> ApiResult<Bytes> {
    let limit = state.config.server.max_part_size as usize;
    axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read payload part: {e}")))
}

/// The shared part-receive flow: stage, verify, record state, and on the
/// final part submit to the finalization queue.
async fn receive_part(
    state: &AppState,
    deposit_id: &DepositId,
    part: PartHeaders,
    body: Bytes,
) -> ApiResult<DepositReceipt> {
    let path = state
        .staging
        .write_part(deposit_id, &part.filename, body)
        .await
        .map_err(|e| match e {
            StorageError::InvalidPartName(m) => ApiError::BadRequest(m),
            StorageError::Io(io) => {
                ApiError::BadRequest(format!("failed to store payload part: {io}"))
            }
            other => other.into(),
        })?;

    // Recompute the digest from what actually landed on disk.
    let actual = digest_file(&path)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to verify payload part: {e}")))?;
    if actual != part.digest {
        tracing::warn!(
            deposit_id = %deposit_id,
            filename = %part.filename,
            expected = %part.digest,
            actual = %actual,
            "part checksum mismatch"
        );
        // Nothing of the rejected part is retained.
        let _ = state.staging.remove_part(&path).await;
        let _ = state.staging.remove_dir_if_empty(deposit_id).await;
        return Err(ApiError::ChecksumMismatch {
            expected: part.digest.to_hex(),
            actual: actual.to_hex(),
        });
    }

    if part.in_progress {
        state
            .props
            .set(
                deposit_id,
                DepositState::Draft,
                "deposit is open for additional parts",
                true,
            )
            .await?;
        state.props.set_mime_type(deposit_id, part.package).await?;
        tracing::debug!(deposit_id = %deposit_id, filename = %part.filename, "part staged");
    } else {
        state
            .props
            .set(
                deposit_id,
                DepositState::Finalizing,
                "deposit is being finalized",
                true,
            )
            .await?;
        state.props.set_mime_type(deposit_id, part.package).await?;
        state
            .finalizer
            .submit(FinalizeRequest {
                deposit_id: deposit_id.clone(),
                package: part.package,
            })
            .await?;
        tracing::info!(deposit_id = %deposit_id, "deposit queued for finalization");
    }

    Ok(DepositReceipt::new(
        state.config.server.base_url(),
        deposit_id,
        &part.filename,
        &part.digest,
    ))
}
