//! End-to-end delivery of the introspection signals.
//!
//! Handlers are process-wide, so everything runs in a single test.

#![cfg(unix)]

use {
  gobject_list::{
    DisplayFlags, SharedBuffer, SimulatedHost, TextWriter, Tracker, TrackerError,
    signals,
  },
  std::sync::Arc,
};

fn raise(signal: libc::c_int) {
  // SAFETY: the handler for `signal` is installed by the test.
  let status = unsafe { libc::raise(signal) };
  assert_eq!(status, 0, "raise({signal}) failed");
}

#[test]
fn signals_drive_dumps_end_to_end() {
  let host = Arc::new(SimulatedHost::new());
  let output = SharedBuffer::new();

  let tracker = Tracker::builder()
    .display(DisplayFlags::NONE)
    .name_prefix(None)
    .program("signals")
    .writer(TextWriter::new(output.clone()))
    .finish(host.clone());

  let dispatcher = signals::install(tracker.clone()).expect("install");
  assert!(matches!(
    signals::install(tracker.clone()),
    Err(TrackerError::AlreadyInstalled)
  ));

  let kept = host.allocate("GstPipeline");
  let dropped = host.allocate("GstBuffer");
  assert!(tracker.object_created(kept));
  assert!(tracker.object_created(dropped));

  raise(signals::DUMP_SIGNAL);
  assert_eq!(
    output.contents(),
    format!(
      "Living Objects:\n - GstPipeline ({kept}) : 1 refs\n - GstBuffer \
       ({dropped}) : 1 refs\n2 objects\n"
    )
  );

  output.clear();
  raise(signals::CHECKPOINT_SIGNAL);
  assert!(output.contents().starts_with("Added Objects:\n"));
  assert!(output.contents().contains("2 objects\n\nRemoved Objects:\n0 objects"));

  host.unref_object(dropped);

  output.clear();
  raise(signals::CHECKPOINT_SIGNAL);
  assert_eq!(
    output.contents(),
    format!(
      "Added Objects:\n0 objects\n\nRemoved Objects:\n - GstBuffer({dropped})\n\
       1 objects\n\nSaved new check point\n"
    )
  );

  assert_eq!(dispatcher.dropped(), 0);
  assert!(!dispatcher.is_terminated());
}
