use eggdb_core::EggType;
use eggdb_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The persistence layer cannot be reached at all. Aborts the run.
    #[error("persistence unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A single observation failed to write.
    #[error("failed to persist {egg_type} observation: {source}")]
    Persistence {
        egg_type: EggType,
        #[source]
        source: DbError,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("scrape run aborted: {0}")]
    PersistenceUnavailable(#[source] RepositoryError),

    #[error("no catalog locations for chain '{0}'")]
    UnknownChain(String),

    #[error("unknown scrape scope '{0}'; expected 'sample' or 'full'")]
    InvalidScope(String),

    #[error(transparent)]
    Db(#[from] DbError),
}
