use {crate::event::ObjectId, std::io, thiserror::Error};

/// Failures at the tracker's fallible edges.
///
/// Core bookkeeping never fails; these cover the collaborators around it.
#[derive(Debug, Error)]
pub enum TrackerError {
  #[error("failed to attach finalization observer to {object}: {reason}")]
  Finalizer { object: ObjectId, reason: String },
  #[error("i/o error while writing tracker output: {0}")]
  Io(#[from] io::Error),
  #[error("failed to encode tracker output as json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("failed to install handler for signal {signal}: {source}")]
  Signal {
    signal: i32,
    #[source]
    source: io::Error,
  },
  #[error("introspection dispatcher is already installed")]
  AlreadyInstalled,
}

impl TrackerError {
  #[must_use]
  pub fn finalizer(object: ObjectId, reason: impl Into<String>) -> Self {
    Self::Finalizer {
      object,
      reason: reason.into(),
    }
  }
}
