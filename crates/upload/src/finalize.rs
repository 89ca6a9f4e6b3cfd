//! Session completion and teardown.

use blobsend_resume::StateStore;
use blobsend_store::{ObjectStore, StoreError};
use tracing::{info, warn};

use crate::session::UploadSession;

/// Asks the store to assemble the session's parts, in ascending order.
///
/// Local state is cleared once the store accepts; a failure to clear is
/// logged but does not undo the completed upload.
pub async fn complete_session(
    store: &dyn ObjectStore,
    state: &dyn StateStore,
    session: &UploadSession,
) -> Result<(), StoreError> {
    let parts = session.completed_parts();
    store
        .complete_multipart(&session.bucket, &session.key, &session.session_id, &parts)
        .await?;

    if let Err(e) = state.clear().await {
        warn!(
            session_id = %session.session_id,
            state = %state.describe(),
            error = %e,
            "failed to clear resume state after completion"
        );
    }
    info!(
        session_id = %session.session_id,
        bucket = %session.bucket,
        key = %session.key,
        parts = parts.len(),
        "multipart session completed"
    );
    Ok(())
}

/// Discards the remote session and clears local state.
///
/// Local state is cleared even if the remote abort fails, since the
/// session is dead either way. The remote failure is logged and returned.
pub async fn abort_session(
    store: &dyn ObjectStore,
    state: &dyn StateStore,
    session: &UploadSession,
) -> Option<StoreError> {
    let remote = store
        .abort_multipart(&session.bucket, &session.key, &session.session_id)
        .await
        .err();
    if let Some(e) = &remote {
        warn!(
            session_id = %session.session_id,
            error = %e,
            "remote abort failed; parts may linger until the store expires them"
        );
    }

    forget_session(state, session).await;
    info!(session_id = %session.session_id, "multipart session aborted");
    remote
}

/// Clears local state for a session the store no longer knows.
pub async fn forget_session(state: &dyn StateStore, session: &UploadSession) {
    if let Err(e) = state.clear().await {
        warn!(
            session_id = %session.session_id,
            state = %state.describe(),
            error = %e,
            "failed to clear resume state"
        );
    }
}
