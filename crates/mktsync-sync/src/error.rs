use mktsync_core::Platform;
use mktsync_db::DbError;
use mktsync_meli::MeliError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("marketplace error: {0}")]
    Api(#[from] MeliError),

    #[error("account {0} not found or has no credential")]
    AccountNotFound(Uuid),

    #[error("no ingestion client for platform {0}")]
    PlatformUnsupported(Platform),
}

impl SyncError {
    /// Storage is unreachable; continuing the run would only repeat the error.
    #[must_use]
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            SyncError::Db(DbError::Sqlx(
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Tls(_)
            ))
        )
    }
}
