use super::*;

/// Asynchronous introspection request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Trigger {
  /// Print every live object.
  DumpLive,
  /// Print and reset the checkpoint deltas.
  Checkpoint,
  /// Print the final report. Terminal.
  Terminate,
}

/// What happened to a delivered trigger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
  /// Run to completion by the delivering thread.
  Handled,
  /// Left for the dump already in progress.
  Queued,
  /// The queue was full.
  Dropped,
  /// The final report was already printed.
  AlreadyTerminated,
}

/// Routes triggers to the tracker without ever running two dumps at once.
///
/// Triggers go through a preallocated lock-free queue. Whoever flips the busy
/// flag drains it; a trigger arriving meanwhile, including one from a signal
/// landing on the draining thread, is picked up by that drain.
#[derive(Debug)]
pub struct Dispatcher {
  busy: AtomicBool,
  dropped: AtomicU64,
  queue: ArrayQueue<Trigger>,
  terminated: AtomicBool,
  tracker: Tracker,
}

impl Dispatcher {
  #[must_use]
  pub fn new(tracker: Tracker) -> Self {
    let capacity = tracker.config().trigger_queue_capacity.max(1);

    Self {
      busy: AtomicBool::new(false),
      dropped: AtomicU64::new(0),
      queue: ArrayQueue::new(capacity),
      terminated: AtomicBool::new(false),
      tracker,
    }
  }

  #[must_use]
  pub fn tracker(&self) -> &Tracker {
    &self.tracker
  }

  /// Triggers lost to a full queue so far.
  #[must_use]
  pub fn dropped(&self) -> u64 {
    self.dropped.load(Ordering::Relaxed)
  }

  #[must_use]
  pub fn is_terminated(&self) -> bool {
    self.terminated.load(Ordering::Acquire)
  }

  pub fn deliver(&self, trigger: Trigger) -> Delivery {
    if trigger == Trigger::Terminate {
      return self.terminate();
    }

    if self.queue.push(trigger).is_err() {
      self.dropped.fetch_add(1, Ordering::Relaxed);
      return Delivery::Dropped;
    }

    self.run_pending()
  }

  /// Run queued triggers unless a drain is already in progress.
  pub fn run_pending(&self) -> Delivery {
    loop {
      if self.busy.swap(true, Ordering::AcqRel) {
        return Delivery::Queued;
      }

      self.drain();
      self.busy.store(false, Ordering::Release);

      // A trigger pushed between the last pop and the release above saw the
      // flag set and left its work to us.
      if self.queue.is_empty() {
        return Delivery::Handled;
      }
    }
  }

  fn drain(&self) {
    while let Some(trigger) = self.queue.pop() {
      match trigger {
        Trigger::DumpLive => {
          self.tracker.dump_live();
        }
        Trigger::Checkpoint => {
          self.tracker.checkpoint();
        }
        Trigger::Terminate => {
          self.terminate();
        }
      }
    }
  }

  /// Print the final report, at most once per dispatcher.
  ///
  /// Bypasses the queue: the process is about to go away and nothing would be
  /// left to drain it.
  pub fn terminate(&self) -> Delivery {
    if self.terminated.swap(true, Ordering::AcqRel) {
      return Delivery::AlreadyTerminated;
    }

    debug!(program = self.tracker.program(), "printing final report");
    self.tracker.dump_still_alive();
    Delivery::Handled
  }
}
