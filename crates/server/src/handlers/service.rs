//! Service document, deposit statement and health handlers.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use depot_core::{DepositId, PACKAGING_BAGIT, PackageType};
use depot_storage::StorageError;
use serde::Serialize;

/// The advertised service document.
#[derive(Debug, Serialize)]
pub struct ServiceDocument {
    /// Location deposits are POSTed to.
    #[serde(rename = "collectionIRI")]
    pub collection_iri: String,
    /// Accepted packaging formats.
    pub packaging: Vec<String>,
    /// Accepted part content types.
    pub accepts: Vec<String>,
    /// Largest accepted part in bytes.
    #[serde(rename = "maxUploadSize")]
    pub max_upload_size: u64,
}

/// GET /servicedocument - Advertise the collection and accepted formats.
pub async fn service_document(State(state): State<AppState>) -> Json<ServiceDocument> {
    Json(ServiceDocument {
        collection_iri: state.config.server.collection_iri(),
        packaging: vec![PACKAGING_BAGIT.to_string()],
        accepts: vec![
            PackageType::Single.mime_type().to_string(),
            PackageType::Chunked.mime_type().to_string(),
        ],
        max_upload_size: state.config.server.max_part_size,
    })
}

/// The statement of a deposit: its current state and description.
#[derive(Debug, Serialize)]
pub struct Statement {
    #[serde(rename = "depositId")]
    pub deposit_id: String,
    pub state: String,
    #[serde(rename = "stateDescription")]
    pub state_description: String,
}

/// GET /statement/{deposit_id} - Report the current deposit state.
#[tracing::instrument(skip(state), fields(deposit_id = %deposit_id))]
pub async fn get_statement(
    State(state): State<AppState>,
    Path(deposit_id): Path<String>,
) -> ApiResult<Json<Statement>> {
    let deposit_id =
        DepositId::parse(&deposit_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = match state.props.get(&deposit_id).await {
        Ok(record) => record,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!(
                "no such deposit: {deposit_id}"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(Statement {
        deposit_id: deposit_id.to_string(),
        state: record.state.as_str().to_string(),
        state_description: record.description,
    }))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /healthz - Liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
