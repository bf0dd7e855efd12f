#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine event queue has been closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
