/// Turns a failed [`Result`] into a log record for errors that are tolerated.
pub trait LogErrorExt<T, E> {
    /// Logs the error at `level` and discards it.
    fn log_err(self, level: log::Level) -> Option<T>;
}

impl<T, E> LogErrorExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn log_err(self, level: log::Level) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::log!(level, "{err}");
                None
            }
        }
    }
}
