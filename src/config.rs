use std::{collections::HashMap, env, sync::Arc};

/// Comma separated display categories.
pub const DISPLAY_VAR: &str = "GOBJECT_LIST_DISPLAY";
/// Type name prefix restricting which objects are tracked.
pub const FILTER_VAR: &str = "GOBJECT_LIST_FILTER";
/// When set, `LD_PRELOAD` is left in place for child processes.
pub const PROPAGATE_VAR: &str = "GOBJECT_PROPAGATE_LD_PRELOAD";
/// `text` or `json`.
pub const FORMAT_VAR: &str = "GOBJECT_LIST_FORMAT";
/// Maximum number of native frames printed per backtrace.
pub const BACKTRACE_DEPTH_VAR: &str = "GOBJECT_LIST_BACKTRACE_DEPTH";

/// Where configuration values are looked up.
#[derive(Clone, Debug, Default)]
pub enum ConfigSource {
  /// The process environment.
  #[default]
  Environment,
  /// A fixed set of values, mostly for tests and embedding.
  Fixed(Arc<HashMap<String, String>>),
}

impl ConfigSource {
  #[must_use]
  pub fn fixed<I, K, V>(values: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self::Fixed(Arc::new(
      values
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect(),
    ))
  }

  #[must_use]
  pub fn get(&self, key: &str) -> Option<String> {
    match self {
      Self::Environment => env::var(key).ok(),
      Self::Fixed(values) => values.get(key).cloned(),
    }
  }

  #[must_use]
  pub fn contains(&self, key: &str) -> bool {
    match self {
      Self::Environment => env::var_os(key).is_some(),
      Self::Fixed(values) => values.contains_key(key),
    }
  }
}

/// Output encoding used by the event recorder.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
  /// Human readable lines.
  #[default]
  Text,
  /// One JSON object per event or report.
  JsonLines,
}

impl OutputFormat {
  #[must_use]
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "text" => Some(Self::Text),
      "json" | "jsonl" => Some(Self::JsonLines),
      _ => None,
    }
  }
}

/// Controls what the tracker reports and how.
///
/// The display categories and the name prefix are not stored here directly:
/// they are resolved lazily from `source` the first time a filter is asked.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
  /// Where the lazily resolved filters read their values from.
  pub source: ConfigSource,
  /// Output encoding.
  pub format: OutputFormat,
  /// Maximum number of native frames captured per backtrace.
  pub max_backtrace_depth: u16,
  /// Frames belonging to the tracker itself, skipped at the top of each trace.
  pub native_skip_frames: usize,
  /// Keep the preload variable for child processes.
  pub propagate_preload: bool,
  /// How long a dump waits for the registry lock before giving up.
  pub dump_lock_timeout_ms: u64,
  /// Capacity of the pending trigger queue.
  pub trigger_queue_capacity: usize,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      source: ConfigSource::Environment,
      format: OutputFormat::Text,
      max_backtrace_depth: 32,
      native_skip_frames: 3,
      propagate_preload: false,
      dump_lock_timeout_ms: 200,
      trigger_queue_capacity: 16,
    }
  }
}

impl TrackerConfig {
  /// Read the eager settings from the process environment.
  #[must_use]
  pub fn from_env() -> Self {
    Self::from_source(ConfigSource::Environment)
  }

  #[must_use]
  pub fn from_source(source: ConfigSource) -> Self {
    let mut config = Self::default();

    if let Some(format) = source
      .get(FORMAT_VAR)
      .as_deref()
      .and_then(OutputFormat::parse)
    {
      config.format = format;
    }

    if let Some(depth) = source
      .get(BACKTRACE_DEPTH_VAR)
      .and_then(|value| value.trim().parse::<u16>().ok())
    {
      config.max_backtrace_depth = depth;
    }

    config.propagate_preload = source.contains(PROPAGATE_VAR);
    config.source = source;
    config
  }

  #[must_use]
  pub fn with_format(mut self, format: OutputFormat) -> Self {
    self.format = format;
    self
  }

  #[must_use]
  pub fn with_max_backtrace_depth(mut self, depth: u16) -> Self {
    self.max_backtrace_depth = depth;
    self
  }

  #[must_use]
  pub fn with_source(mut self, source: ConfigSource) -> Self {
    self.source = source;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fixed_source_overrides_defaults() {
    let config = TrackerConfig::from_source(ConfigSource::fixed([
      (FORMAT_VAR, "JSON"),
      (BACKTRACE_DEPTH_VAR, "4"),
      (PROPAGATE_VAR, ""),
    ]));

    assert_eq!(config.format, OutputFormat::JsonLines);
    assert_eq!(config.max_backtrace_depth, 4);
    assert!(config.propagate_preload);
  }

  #[test]
  fn malformed_values_keep_defaults() {
    let config = TrackerConfig::from_source(ConfigSource::fixed([
      (FORMAT_VAR, "xml"),
      (BACKTRACE_DEPTH_VAR, "deep"),
    ]));

    assert_eq!(config.format, OutputFormat::Text);
    assert_eq!(config.max_backtrace_depth, 32);
    assert!(!config.propagate_preload);
  }
}
