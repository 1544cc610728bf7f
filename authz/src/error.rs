use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthzError {
    /// No authenticated principal was presented. Distinct from
    /// `Forbidden` so the boundary can answer 401 instead of 403.
    #[error("not authenticated")]
    Unauthenticated,

    /// The principal is authenticated but does not hold the capability
    #[error("access denied: missing capability {capability}")]
    Forbidden { capability: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
