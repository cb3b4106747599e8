use super::*;

/// Printed on stderr in place of a report whose output lock stayed busy.
pub const OUTPUT_BUSY: &str = "gobject-list: output busy, report skipped\n";

/// Serializes all tracker output behind the output lock.
///
/// Lock order: the output lock may be taken while the registry lock is held,
/// never the other way around. Reports take it with a bound, since a trigger
/// can land on a thread that is in the middle of writing a trace line.
pub struct Recorder {
  collector: StackCollector,
  program: Arc<str>,
  report_timeout: Duration,
  writer: Mutex<Box<dyn ReportWriter + Send>>,
}

impl Recorder {
  #[must_use]
  pub fn new(
    writer: Box<dyn ReportWriter + Send>,
    config: &TrackerConfig,
  ) -> Self {
    Self {
      collector: StackCollector::new(config),
      program: Arc::from(program_name()),
      report_timeout: Duration::from_millis(config.dump_lock_timeout_ms),
      writer: Mutex::new(writer),
    }
  }

  /// Writer matching the configured format, on stderr.
  #[must_use]
  pub fn stderr(config: &TrackerConfig) -> Self {
    let writer: Box<dyn ReportWriter + Send> = match config.format {
      OutputFormat::Text => Box::new(TextWriter::new(io::stderr())),
      OutputFormat::JsonLines => Box::new(JsonLinesWriter::new(io::stderr())),
    };

    Self::new(writer, config)
  }

  #[must_use]
  pub fn with_program(mut self, program: &str) -> Self {
    self.program = Arc::from(program);
    self
  }

  #[must_use]
  pub fn program(&self) -> &str {
    &self.program
  }

  fn lock_writer(&self) -> MutexGuard<'_, Box<dyn ReportWriter + Send>> {
    match self.writer.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  /// Run `func` with the writer, or report on fd 2 that it stayed busy.
  fn with_report_writer(
    &self,
    func: impl FnOnce(
      &mut (dyn ReportWriter + Send),
    ) -> Result<(), TrackerError>,
  ) -> Result<bool, TrackerError> {
    match try_lock_for(&self.writer, self.report_timeout) {
      Some(mut writer) => func(&mut **writer).map(|()| true),
      None => {
        write_stderr_raw(OUTPUT_BUSY);
        Ok(false)
      }
    }
  }

  /// Print one trace line, followed by the caller's backtrace when asked.
  pub fn event(&self, event: &TraceEvent, backtrace: bool) {
    let mut writer = self.lock_writer();

    let frames = if backtrace {
      self.collector.capture()
    } else {
      Vec::new()
    };

    if let Err(err) = writer.write_event(event, &frames) {
      warn!(%err, object = %event.object, "failed to write trace event");
    }
  }

  /// Returns whether the dump reached the writer.
  pub fn live(&self, snapshot: &LiveSnapshot, reason: DumpReason) -> bool {
    self
      .with_report_writer(|writer| {
        writer.write_live(snapshot, reason, &self.program)
      })
      .unwrap_or_else(|err| {
        warn!(%err, "failed to write live object dump");
        false
      })
  }

  /// Returns whether the report reached the writer.
  pub fn checkpoint(&self, report: &CheckpointReport) -> bool {
    self
      .with_report_writer(|writer| writer.write_checkpoint(report))
      .unwrap_or_else(|err| {
        warn!(%err, "failed to write checkpoint report");
        false
      })
  }

  pub fn notice(&self, message: &str) -> bool {
    self
      .with_report_writer(|writer| writer.write_notice(message))
      .unwrap_or_else(|err| {
        warn!(%err, "failed to write notice");
        false
      })
  }
}

impl Debug for Recorder {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Recorder")
      .field("collector", &self.collector)
      .field("program", &self.program)
      .field("report_timeout", &self.report_timeout)
      .finish_non_exhaustive()
  }
}

/// Short name of the running program, for the final report.
#[must_use]
pub fn program_name() -> String {
  env::args_os()
    .next()
    .as_deref()
    .map(Path::new)
    .and_then(Path::file_name)
    .and_then(OsStr::to_str)
    .map_or_else(|| "<unknown>".to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn concurrent_events_do_not_interleave_lines() {
    let sink = SharedBuffer::new();
    let recorder = Arc::new(
      Recorder::new(
        Box::new(TextWriter::new(sink.clone())),
        &TrackerConfig::default(),
      )
      .with_program("test"),
    );

    let handles = (0..4)
      .map(|worker| {
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || {
          for index in 0..50 {
            let event = TraceEvent::new(
              EventKind::Created,
              ObjectId::new(worker * 0x1000 + index),
              Arc::from("GstBuffer"),
            );
            recorder.event(&event, false);
          }
        })
      })
      .collect::<Vec<_>>();

    for handle in handles {
      handle.join().expect("writer thread");
    }

    let output = sink.contents();
    assert_eq!(output.lines().count(), 200);
    assert!(output
      .lines()
      .all(|line| line.starts_with(" ++ Created object GstBuffer(0x")));
  }

  #[test]
  fn backtrace_lines_follow_their_event() {
    let sink = SharedBuffer::new();
    let recorder = Recorder::new(
      Box::new(TextWriter::new(sink.clone())),
      &TrackerConfig::default().with_max_backtrace_depth(4),
    );

    let event = TraceEvent::new(
      EventKind::Finalized,
      ObjectId::new(0x10),
      Arc::from("GstPad"),
    );
    recorder.event(&event, true);

    let output = sink.contents();
    let mut lines = output.lines();
    assert_eq!(lines.next(), Some(" -- Finalized GstPad(0x10)"));
    assert!(lines.all(|line| line.starts_with('#')));
  }

  #[test]
  fn reports_give_up_on_a_busy_writer() {
    let sink = SharedBuffer::new();
    let recorder = Recorder::new(
      Box::new(TextWriter::new(sink.clone())),
      &TrackerConfig {
        dump_lock_timeout_ms: 10,
        ..TrackerConfig::default()
      },
    );

    let held = recorder.lock_writer();
    let started = Instant::now();
    let empty = LiveSnapshot::new(Vec::new(), 0);
    assert!(!recorder.live(&empty, DumpReason::Requested));
    assert!(!recorder.notice("busy"));
    assert!(started.elapsed() < Duration::from_secs(5));
    drop(held);

    assert!(sink.contents().is_empty());
    assert!(recorder.notice("free"));
    assert_eq!(sink.contents(), "free\n");
  }
}
