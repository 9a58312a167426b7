use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transaction manager already shut down")]
    AlreadyShutdown,

    #[error("Transaction conflict detected")]
    TransactionConflict,

    #[error("Failed to apply committed transaction")]
    ApplyFailed(#[source] Box<Error>),

    #[error("Transaction is no longer open")]
    TransactionClosed,

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, Error>;
