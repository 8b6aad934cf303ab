//! Post-dispatch steps: rotate the API token, then share the folder.
//! Every call is made once; any failure ends the run.

use tracing::{error, info};

use crate::bootstrap::FolderTarget;
use crate::contract::{CredentialStore, ShareService, TokenExchange};
use crate::error::{RunError, ShareError};

/// Exchange the stored refresh token for an access token, persisting the
/// rotated refresh token before returning.
pub async fn rotate_access_token<X, C>(exchange: &X, store: &C) -> Result<String, ShareError>
where
    X: TokenExchange + ?Sized,
    C: CredentialStore + ?Sized,
{
    let refresh = store.load_refresh_token().await?;
    let pair = exchange.refresh(&refresh).await?;
    store.save_refresh_token(&pair.refresh_token).await?;
    info!("[FINALIZE] access token refreshed and refresh token rotated");
    Ok(pair.access_token)
}

/// Resolve the folder, grant every recipient read access and create the
/// share link. Fills in `target.id` and `target.share_link`.
pub async fn share_folder<S>(
    share: &S,
    access_token: &str,
    target: &mut FolderTarget,
    recipients: &[String],
) -> Result<(), ShareError>
where
    S: ShareService + ?Sized,
{
    let id = share.find_folder(access_token, &target.name).await?;
    info!(folder = %target.name, folder_id = %id, "[FINALIZE] folder resolved");

    for recipient in recipients {
        share.grant_read(access_token, &id, recipient).await?;
        info!(folder_id = %id, recipient = %recipient, "[FINALIZE] read access granted");
    }

    let link = share.create_share_link(access_token, &id).await?;
    info!(folder_id = %id, link = %link, "[FINALIZE] share link created");
    target.id = Some(id);
    target.share_link = Some(link);
    Ok(())
}

pub async fn finalize<X, C, S>(
    exchange: &X,
    store: &C,
    share: &S,
    target: &mut FolderTarget,
    recipients: &[String],
) -> Result<(), RunError>
where
    X: TokenExchange + ?Sized,
    C: CredentialStore + ?Sized,
    S: ShareService + ?Sized,
{
    let result = async {
        let access = rotate_access_token(exchange, store).await?;
        share_folder(share, &access, &mut *target, recipients).await
    }
    .await;

    result.map_err(|e| {
        error!(folder = %target.name, error = %e, "[FINALIZE] finalization failed");
        RunError::Finalize(e)
    })
}
