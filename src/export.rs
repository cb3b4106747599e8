use super::*;

/// Sink for everything the tracker prints.
///
/// Implementations are driven while the output lock is held, so a single call
/// may emit several lines without interleaving with other threads.
pub trait ReportWriter {
  /// # Errors
  ///
  /// Returns an error if the underlying writer fails.
  fn write_event(
    &mut self,
    event: &TraceEvent,
    frames: &[FrameMetadata],
  ) -> Result<(), TrackerError>;

  /// # Errors
  ///
  /// Returns an error if the underlying writer fails.
  fn write_live(
    &mut self,
    snapshot: &LiveSnapshot,
    reason: DumpReason,
    program: &str,
  ) -> Result<(), TrackerError>;

  /// # Errors
  ///
  /// Returns an error if the underlying writer fails.
  fn write_checkpoint(
    &mut self,
    report: &CheckpointReport,
  ) -> Result<(), TrackerError>;

  /// # Errors
  ///
  /// Returns an error if the underlying writer fails.
  fn write_notice(&mut self, message: &str) -> Result<(), TrackerError>;
}

/// Human readable, line oriented output.
pub struct TextWriter<W: Write> {
  writer: W,
}

impl<W: Write> TextWriter<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }

  fn write_entries(&mut self, snapshot: &LiveSnapshot) -> io::Result<()> {
    for entry in snapshot.entries() {
      match entry.ref_count {
        Some(refs) => writeln!(
          self.writer,
          " - {} ({}) : {refs} refs",
          entry.type_name, entry.object
        )?,
        None => writeln!(
          self.writer,
          " - {} ({}) : ? refs",
          entry.type_name, entry.object
        )?,
      }
    }

    writeln!(self.writer, "{} objects", snapshot.count())
  }
}

impl<W: Write> ReportWriter for TextWriter<W> {
  fn write_event(
    &mut self,
    event: &TraceEvent,
    frames: &[FrameMetadata],
  ) -> Result<(), TrackerError> {
    let TraceEvent {
      kind,
      object,
      type_name,
    } = event;

    match kind {
      EventKind::Created => {
        writeln!(self.writer, " ++ Created object {type_name}({object})")?;
      }
      EventKind::Reffed { before, after } => writeln!(
        self.writer,
        " +  Reffed object {type_name}({object}); ref_count: {before} -> {after}"
      )?,
      EventKind::Unreffed { before, after } => writeln!(
        self.writer,
        " -  Unreffed object {type_name}({object}); ref_count: {before} -> {after}"
      )?,
      EventKind::Finalized => {
        writeln!(self.writer, " -- Finalized {type_name}({object})")?;
      }
    }

    for (index, frame) in frames.iter().enumerate() {
      writeln!(
        self.writer,
        "#{index}  {} + [{:#010x}]",
        frame.function, frame.offset
      )?;
    }

    self.writer.flush()?;
    Ok(())
  }

  fn write_live(
    &mut self,
    snapshot: &LiveSnapshot,
    reason: DumpReason,
    program: &str,
  ) -> Result<(), TrackerError> {
    match reason {
      DumpReason::Requested => writeln!(self.writer, "Living Objects:")?,
      DumpReason::StillAlive => {
        writeln!(self.writer, "\nStill Alive in {program}:")?;
      }
    }

    self.write_entries(snapshot)?;
    self.writer.flush()?;
    Ok(())
  }

  fn write_checkpoint(
    &mut self,
    report: &CheckpointReport,
  ) -> Result<(), TrackerError> {
    writeln!(self.writer, "Added Objects:")?;
    self.write_entries(report.added())?;

    writeln!(self.writer, "\nRemoved Objects:")?;
    for entry in report.removed() {
      writeln!(self.writer, " - {}({})", entry.type_name, entry.object)?;
    }
    writeln!(self.writer, "{} objects", report.removed().len())?;

    writeln!(self.writer, "\nSaved new check point")?;
    self.writer.flush()?;
    Ok(())
  }

  fn write_notice(&mut self, message: &str) -> Result<(), TrackerError> {
    writeln!(self.writer, "{message}")?;
    self.writer.flush()?;
    Ok(())
  }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case", tag = "report")]
enum Record<'a> {
  Event {
    #[serde(flatten)]
    event: &'a TraceEvent,
    #[serde(skip_serializing_if = "no_frames")]
    frames: &'a [FrameMetadata],
  },
  Live {
    reason: DumpReason,
    program: &'a str,
    #[serde(flatten)]
    snapshot: &'a LiveSnapshot,
  },
  Checkpoint {
    #[serde(flatten)]
    checkpoint: &'a CheckpointReport,
  },
  Notice {
    message: &'a str,
  },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_frames(frames: &&[FrameMetadata]) -> bool {
  frames.is_empty()
}

/// JSON lines exporter that writes one JSON object per event or report.
pub struct JsonLinesWriter<W: Write> {
  writer: W,
}

impl<W: Write> JsonLinesWriter<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }

  fn write_record(&mut self, record: &Record<'_>) -> Result<(), TrackerError> {
    serde_json::to_writer(&mut self.writer, record)?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;
    Ok(())
  }
}

impl<W: Write> ReportWriter for JsonLinesWriter<W> {
  fn write_event(
    &mut self,
    event: &TraceEvent,
    frames: &[FrameMetadata],
  ) -> Result<(), TrackerError> {
    self.write_record(&Record::Event { event, frames })
  }

  fn write_live(
    &mut self,
    snapshot: &LiveSnapshot,
    reason: DumpReason,
    program: &str,
  ) -> Result<(), TrackerError> {
    self.write_record(&Record::Live {
      reason,
      program,
      snapshot,
    })
  }

  fn write_checkpoint(
    &mut self,
    report: &CheckpointReport,
  ) -> Result<(), TrackerError> {
    self.write_record(&Record::Checkpoint { checkpoint: report })
  }

  fn write_notice(&mut self, message: &str) -> Result<(), TrackerError> {
    self.write_record(&Record::Notice { message })
  }
}

/// Cloneable in-memory writer; every clone appends to the same buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer {
  bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Everything written so far, lossily decoded.
  #[must_use]
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.lock_bytes()).into_owned()
  }

  pub fn clear(&self) {
    self.lock_bytes().clear();
  }

  fn lock_bytes(&self) -> MutexGuard<'_, Vec<u8>> {
    match self.bytes.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }
}

impl Write for SharedBuffer {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.lock_bytes().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn live(entries: Vec<LiveEntry>, count: usize) -> LiveSnapshot {
    LiveSnapshot::new(entries, count)
  }

  fn entry(address: usize, name: &str, refs: Option<u32>) -> LiveEntry {
    LiveEntry {
      object: ObjectId::new(address),
      type_name: Arc::from(name),
      ref_count: refs,
    }
  }

  fn text(write: impl FnOnce(&mut TextWriter<Vec<u8>>)) -> String {
    let mut writer = TextWriter::new(Vec::new());
    write(&mut writer);
    String::from_utf8(writer.into_inner()).expect("utf-8 output")
  }

  #[test]
  fn text_event_lines_match_trace_format() {
    let output = text(|writer| {
      let event = TraceEvent::reffed(ObjectId::new(0x10), Arc::from("GstBin"), 1);
      let frames = [FrameMetadata::new("gst_bin_new", 0x1c)];
      writer.write_event(&event, &frames).expect("write");
    });

    assert_eq!(
      output,
      " +  Reffed object GstBin(0x10); ref_count: 1 -> 2\n\
       #0  gst_bin_new + [0x0000001c]\n"
    );
  }

  #[test]
  fn text_live_dump_lists_entries_and_total() {
    let output = text(|writer| {
      let snapshot = live(
        vec![entry(0x10, "GstBin", Some(2)), entry(0x20, "GstPad", None)],
        3,
      );
      writer
        .write_live(&snapshot, DumpReason::Requested, "demo")
        .expect("write");
    });

    assert_eq!(
      output,
      "Living Objects:\n \
       - GstBin (0x10) : 2 refs\n \
       - GstPad (0x20) : ? refs\n\
       3 objects\n"
    );
  }

  #[test]
  fn text_still_alive_names_the_program() {
    let output = text(|writer| {
      writer
        .write_live(&LiveSnapshot::default(), DumpReason::StillAlive, "demo")
        .expect("write");
    });

    assert_eq!(output, "\nStill Alive in demo:\n0 objects\n");
  }

  #[test]
  fn text_checkpoint_prints_both_sets() {
    let output = text(|writer| {
      let report = CheckpointReport::new(
        0,
        live(vec![entry(0x30, "Bar", Some(1))], 1),
        vec![RemovedEntry {
          object: ObjectId::new(0x40),
          type_name: Arc::from("Foo"),
        }],
      );
      writer.write_checkpoint(&report).expect("write");
    });

    assert_eq!(
      output,
      "Added Objects:\n \
       - Bar (0x30) : 1 refs\n\
       1 objects\n\
       \n\
       Removed Objects:\n \
       - Foo(0x40)\n\
       1 objects\n\
       \n\
       Saved new check point\n"
    );
  }

  #[test]
  fn json_lines_are_tagged_by_report_kind() {
    let mut writer = JsonLinesWriter::new(Vec::new());
    let event = TraceEvent::new(
      EventKind::Created,
      ObjectId::new(0x10),
      Arc::from("GstBin"),
    );
    writer.write_event(&event, &[]).expect("write");
    writer
      .write_live(
        &live(vec![entry(0x10, "GstBin", Some(1))], 1),
        DumpReason::StillAlive,
        "demo",
      )
      .expect("write");

    let output = String::from_utf8(writer.into_inner()).expect("utf-8");
    let lines = output
      .lines()
      .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json"))
      .collect::<Vec<_>>();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["report"], "event");
    assert_eq!(lines[0]["kind"], "created");
    assert!(lines[0].get("frames").is_none());
    assert_eq!(lines[1]["report"], "live");
    assert_eq!(lines[1]["reason"], "still_alive");
    assert_eq!(lines[1]["entries"][0]["ref_count"], 1);
  }

  #[test]
  fn json_checkpoint_and_notice_records() {
    let mut writer = JsonLinesWriter::new(Vec::new());
    let report = CheckpointReport::new(
      3,
      live(vec![entry(0x30, "Bar", Some(2))], 1),
      vec![RemovedEntry {
        object: ObjectId::new(0x40),
        type_name: Arc::from("Foo"),
      }],
    );
    writer.write_checkpoint(&report).expect("write");
    writer.write_notice("registry busy").expect("write");

    let output = String::from_utf8(writer.into_inner()).expect("utf-8");
    let lines = output
      .lines()
      .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json"))
      .collect::<Vec<_>>();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["report"], "checkpoint");
    assert_eq!(lines[0]["generation"], 3);
    assert_eq!(lines[0]["added"]["count"], 1);
    assert_eq!(lines[0]["added"]["entries"][0]["object"], "0x30");
    assert_eq!(lines[0]["added"]["entries"][0]["type_name"], "Bar");
    assert_eq!(lines[0]["removed"][0]["object"], "0x40");
    assert_eq!(lines[0]["removed"][0]["type_name"], "Foo");
    assert_eq!(lines[1]["report"], "notice");
    assert_eq!(lines[1]["message"], "registry busy");
  }
}
