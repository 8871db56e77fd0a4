use crate::api::{parse_json, with_conn, ApiError};
use crate::middleware::AccountContext;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
};
use kindred_friends::{account_stats, image_paths_for_account};
use kindred_identity::{create_account, delete_account};
use kindred_types::AccountStats;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub account_id: String,
    /// Bearer token for subsequent requests. Only ever returned here.
    pub token: String,
}

/// Handler for `POST /api/accounts`.
pub async fn register_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let request: RegisterRequest = parse_json(&body)?;
    let created = with_conn(&state, move |conn| {
        Ok(create_account(conn, &request.email, &request.name)?)
    })
    .await?;

    tracing::info!(account_id = %created.account.id, "account created");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            account_id: created.account.id,
            token: created.token,
        }),
    ))
}

/// Handler for `GET /api/account/stats`.
pub async fn stats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AccountContext(account)): Extension<AccountContext>,
) -> Result<Json<AccountStats>, ApiError> {
    let stats = with_conn(&state, move |conn| Ok(account_stats(conn, &account.id)?)).await?;
    Ok(Json(stats))
}

/// Handler for `DELETE /api/account`.
///
/// Friends and messages go with the account row; stored images are removed
/// from disk afterwards.
pub async fn delete_account_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AccountContext(account)): Extension<AccountContext>,
) -> Result<StatusCode, ApiError> {
    let account_id = account.id.clone();
    let image_paths =
        with_conn(&state, move |conn| delete_account_collecting_images(conn, &account_id)).await?;

    for path in &image_paths {
        state.image_store.remove(path).await;
    }

    tracing::info!(account_id = %account.id, images = image_paths.len(), "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes the account and returns the image paths its friends held.
///
/// The read and the delete share one immediate transaction, so a friend
/// created concurrently either blocks on the write lock or is already
/// counted.
fn delete_account_collecting_images(
    conn: &mut Connection,
    account_id: &str,
) -> Result<Vec<String>, ApiError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| ApiError::Internal(format!("could not begin transaction: {}", e)))?;
    let paths = image_paths_for_account(&tx, account_id)?;
    delete_account(&tx, account_id)?;
    tx.commit()
        .map_err(|e| ApiError::Internal(format!("could not commit account deletion: {}", e)))?;
    Ok(paths)
}
