use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("this bridge instance has been disposed")]
    Disposed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Render an error and its source chain as a single diagnostic string.
///
/// Used by workers to turn an executor failure into the `exception` text of
/// a failed result frame.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\ncaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
