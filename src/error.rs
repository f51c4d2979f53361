use crate::engine::EngineError;

/// All errors surfaced by this crate.
///
/// Engine failures are carried as a boxed source and otherwise left
/// untouched, so callers can downcast to the engine's own error type when
/// they need the details.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The embedded engine reported a failure (prepare, execute, apply,
    /// sync). The original error is available via [`std::error::Error::source`].
    #[error("engine error: {0}")]
    Engine(#[source] EngineError),

    /// `apply_changeset` received malformed JSON or a tuple of the wrong
    /// shape.
    #[error("Invalid changeset format. Expected a JSON array of change tuples.")]
    InvalidChangeset,

    /// A migration failed to apply. The failed migration is not recorded in
    /// the bookkeeping table.
    #[error("migration '{hash}' failed")]
    Migration {
        hash: String,
        #[source]
        source: Box<Error>,
    },

    /// The caller violated an API contract (missing engine capabilities,
    /// nested live-query registration, statement used outside its
    /// transaction, a non-websocket sync endpoint).
    #[error("{0}")]
    Usage(String),
}

impl From<EngineError> for Error {
    fn from(source: EngineError) -> Self {
        Error::Engine(source)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
