use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling or running a pipeline.
///
/// Construction-time variants (`ElementCreation`, `MissingPad`,
/// `AmbiguousPad`, `LinkFailed`, `ConfigParse`, `StateChange`) are fatal and
/// abort startup. Per-frame variants (`MalformedBatch`, `PoolExhausted`) are
/// isolated to the frame they occurred on and only logged; the running graph
/// is never torn down for them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create element '{name}' from factory '{factory}'")]
    ElementCreation { factory: String, name: String },

    #[error("element '{element}' has no pad '{pad}'")]
    MissingPad { element: String, pad: String },

    #[error("pad '{pad}' matches {matches} link rules, cannot continue")]
    AmbiguousPad { pad: String, matches: usize },

    #[error("failed to link '{src}' -> '{dest}': {reason}")]
    LinkFailed {
        src: String,
        dest: String,
        reason: String,
    },

    #[error("bad config file '{}': {reason}", .path.display())]
    ConfigParse { path: PathBuf, reason: String },

    #[error("malformed detection metadata: {0}")]
    MalformedBatch(String),

    #[error("display meta pool exhausted after {allocated} allocations")]
    PoolExhausted { allocated: usize },

    #[error("failed to change pipeline state: {0}")]
    StateChange(String),

    #[error("error from element '{element}': {message}")]
    Pipeline { element: String, message: String },
}
