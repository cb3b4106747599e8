use super::*;

/// A single resolved native frame.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FrameMetadata {
  pub function: Arc<str>,
  /// Distance from the start of `function` to the return address.
  pub offset: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub filename: Option<Arc<str>>,
  pub lineno: u32,
}

impl FrameMetadata {
  #[must_use]
  pub fn new(function: impl Into<String>, offset: usize) -> Self {
    Self {
      function: Arc::<str>::from(function.into()),
      offset,
      filename: None,
      lineno: 0,
    }
  }

  #[must_use]
  pub fn with_location(mut self, filename: impl Into<String>, lineno: u32) -> Self {
    self.filename = Some(Arc::<str>::from(filename.into()));
    self.lineno = lineno;
    self
  }
}

/// Captures the native call stack of the current thread.
#[derive(Clone, Debug)]
pub struct StackCollector {
  max_depth: usize,
  skip_frames: usize,
}

impl StackCollector {
  #[must_use]
  pub fn new(config: &TrackerConfig) -> Self {
    Self {
      max_depth: usize::from(config.max_backtrace_depth),
      skip_frames: config.native_skip_frames,
    }
  }

  /// Walk and symbolize the current stack, innermost frame first.
  #[must_use]
  pub fn capture(&self) -> Vec<FrameMetadata> {
    let mut frames = Vec::with_capacity(self.max_depth.min(64));

    if self.max_depth == 0 {
      return frames;
    }

    let mut remaining_skip = self.skip_frames;

    backtrace::trace(|frame| {
      if remaining_skip > 0 {
        remaining_skip -= 1;
        return true;
      }

      frames.push(extract_metadata(frame));
      frames.len() < self.max_depth
    });

    frames
  }
}

fn extract_metadata(frame: &Frame) -> FrameMetadata {
  let ip = frame.ip() as usize;
  let mut function = None;
  let mut start = None;
  let mut filename = None;
  let mut lineno = None;

  backtrace::resolve_frame(frame, |symbol| {
    if function.is_none() {
      function = symbol.name().map(|name| symbol_name_to_string(&name));
    }

    if start.is_none() {
      start = symbol.addr().map(|addr| addr as usize);
    }

    if filename.is_none() {
      filename = symbol
        .filename()
        .and_then(path_to_string)
        .map(str::to_string);
    }

    if lineno.is_none() {
      lineno = symbol.lineno();
    }
  });

  let start = start.unwrap_or_else(|| frame.symbol_address() as usize);
  let metadata = FrameMetadata::new(
    function.unwrap_or_else(|| "<unknown>".to_string()),
    ip.saturating_sub(start),
  );

  match filename {
    Some(filename) => metadata.with_location(filename, lineno.unwrap_or(0)),
    None => metadata,
  }
}

fn path_to_string(path: &Path) -> Option<&str> {
  path
    .to_str()
    .or_else(|| path.file_name().and_then(OsStr::to_str))
}

fn symbol_name_to_string(name: &SymbolName<'_>) -> String {
  format!("{name}")
}
