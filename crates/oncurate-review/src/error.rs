use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewError>;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error(transparent)]
    Store(#[from] oncurate_store::StoreError),

    #[error(transparent)]
    Curation(#[from] oncurate_common::CurationError),
}
