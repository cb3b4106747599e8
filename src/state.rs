use super::*;

/// Customizes a [`Tracker`] without exposing every knob up front.
#[derive(Default)]
pub struct TrackerBuilder {
  config: TrackerConfig,
  display: Option<DisplayFlags>,
  name_prefix: Option<Option<String>>,
  program: Option<String>,
  writer: Option<Box<dyn ReportWriter + Send>>,
}

impl TrackerBuilder {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn with_config(mut self, config: TrackerConfig) -> Self {
    self.config = config;
    self
  }

  /// Fix the display categories instead of reading them from the source.
  #[must_use]
  pub fn display(mut self, flags: DisplayFlags) -> Self {
    self.display = Some(flags);
    self
  }

  /// Fix the type name prefix instead of reading it from the source.
  #[must_use]
  pub fn name_prefix(mut self, prefix: Option<&str>) -> Self {
    self.name_prefix = Some(prefix.map(str::to_owned));
    self
  }

  #[must_use]
  pub fn program(mut self, program: &str) -> Self {
    self.program = Some(program.to_owned());
    self
  }

  /// Send output to `writer` instead of stderr.
  #[must_use]
  pub fn writer(mut self, writer: impl ReportWriter + Send + 'static) -> Self {
    self.writer = Some(Box::new(writer));
    self
  }

  #[must_use]
  pub fn finish(self, host: Arc<dyn ObjectHost>) -> Tracker {
    let Self {
      config,
      display,
      name_prefix,
      program,
      writer,
    } = self;

    let display = match display {
      Some(flags) => DisplayFilter::fixed(flags),
      None => DisplayFilter::new(config.source.clone()),
    };

    let names = match name_prefix {
      Some(prefix) => NameFilter::fixed(prefix.as_deref()),
      None => NameFilter::new(config.source.clone()),
    };

    let recorder = match writer {
      Some(writer) => Recorder::new(writer, &config),
      None => Recorder::stderr(&config),
    };

    let recorder = match program {
      Some(program) => recorder.with_program(&program),
      None => recorder,
    };

    Tracker {
      inner: Arc::new(TrackerInner {
        dump_timeout: Duration::from_millis(config.dump_lock_timeout_ms),
        config,
        display,
        names,
        host,
        recorder,
        registry: Mutex::new(Registry::new()),
      }),
    }
  }
}

struct TrackerInner {
  config: TrackerConfig,
  display: DisplayFilter,
  dump_timeout: Duration,
  host: Arc<dyn ObjectHost>,
  names: NameFilter,
  recorder: Recorder,
  registry: Mutex<Registry>,
}

/// Process-wide tracking context.
///
/// Every creation and finalization goes through the registry lock for its
/// whole duration, which totally orders them and makes a reused address safe
/// to record once the previous owner's finalization has completed. Output is
/// serialized separately by the recorder; the registry lock is always taken
/// first.
#[derive(Clone)]
pub struct Tracker {
  inner: Arc<TrackerInner>,
}

impl Tracker {
  /// Tracker configured from the process environment, printing to stderr.
  #[must_use]
  pub fn new(host: Arc<dyn ObjectHost>) -> Self {
    TrackerBuilder::new()
      .with_config(TrackerConfig::from_env())
      .finish(host)
  }

  #[must_use]
  pub fn builder() -> TrackerBuilder {
    TrackerBuilder::new()
  }

  #[must_use]
  pub fn config(&self) -> &TrackerConfig {
    &self.inner.config
  }

  #[must_use]
  pub fn display(&self) -> &DisplayFilter {
    &self.inner.display
  }

  #[must_use]
  pub fn names(&self) -> &NameFilter {
    &self.inner.names
  }

  #[must_use]
  pub fn program(&self) -> &str {
    self.inner.recorder.program()
  }

  fn lock_registry(&self) -> MutexGuard<'_, Registry> {
    match self.inner.registry.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  /// Bounded acquisition used by dumps, which may run in signal context on a
  /// thread that already holds the lock.
  fn try_lock_registry(&self) -> Option<MutexGuard<'_, Registry>> {
    try_lock_for(&self.inner.registry, self.inner.dump_timeout)
  }

  /// Record a newly created object, asking the host for its type name.
  ///
  /// Returns whether the object is now tracked by this call.
  pub fn object_created(&self, object: ObjectId) -> bool {
    match self.inner.host.type_name(object) {
      Some(type_name) => self.object_created_named(object, type_name),
      None => {
        debug!(%object, "created object has no type name, not tracking");
        false
      }
    }
  }

  /// Record a newly created object whose type name is already known.
  pub fn object_created_named(
    &self,
    object: ObjectId,
    type_name: Arc<str>,
  ) -> bool {
    if !self.inner.names.matches(&type_name) {
      return false;
    }

    let mut registry = self.lock_registry();

    if !registry.record_created(object, Arc::clone(&type_name)) {
      debug!(%object, %type_name, "object already tracked");
      return false;
    }

    let tracker = Arc::downgrade(&self.inner);
    let notify: FinalizeNotify = Box::new(move |object| {
      if let Some(inner) = tracker.upgrade() {
        Tracker { inner }.object_finalized(object);
      }
    });

    if let Err(err) = self.inner.host.register_finalizer(object, notify) {
      warn!(%err, "dropping object without a finalization observer");
      registry.forget(object);
      return false;
    }

    // Still under the registry lock, so the Created line precedes the
    // Finalized line of the same object.
    if self.inner.display.enabled(DisplayFlags::CREATE) {
      let event = TraceEvent::new(EventKind::Created, object, type_name);
      self.inner.recorder.event(&event, self.backtraces());
    }

    true
  }

  /// Trace a reference increment; `before` is the count prior to it.
  pub fn object_reffed(&self, object: ObjectId, before: u32) {
    if let Some(type_name) = self.traced_refs_type(object) {
      let event = TraceEvent::reffed(object, type_name, before);
      self.inner.recorder.event(&event, self.backtraces());
    }
  }

  /// Trace a reference decrement; `before` is the count prior to it.
  pub fn object_unreffed(&self, object: ObjectId, before: u32) {
    if let Some(type_name) = self.traced_refs_type(object) {
      let event = TraceEvent::unreffed(object, type_name, before);
      self.inner.recorder.event(&event, self.backtraces());
    }
  }

  fn traced_refs_type(&self, object: ObjectId) -> Option<Arc<str>> {
    if !self.inner.display.enabled(DisplayFlags::REFS) {
      return None;
    }

    self
      .inner
      .host
      .type_name(object)
      .filter(|type_name| self.inner.names.matches(type_name))
  }

  fn backtraces(&self) -> bool {
    self.inner.display.enabled(DisplayFlags::BACKTRACE)
  }

  /// Finalization hook body: the host is destroying `object`.
  ///
  /// The type name comes from the registry, the object itself can no longer
  /// be asked.
  pub fn object_finalized(&self, object: ObjectId) {
    let mut registry = self.lock_registry();

    if self.inner.display.enabled(DisplayFlags::CREATE) {
      if let Some(type_name) = registry.type_name(object) {
        let event =
          TraceEvent::new(EventKind::Finalized, object, Arc::clone(type_name));
        self.inner.recorder.event(&event, self.backtraces());
      }
    }

    registry.record_finalized(object);
  }

  #[must_use]
  pub fn is_tracked(&self, object: ObjectId) -> bool {
    self.lock_registry().is_live(object)
  }

  #[must_use]
  pub fn stats(&self) -> RegistryStats {
    self.lock_registry().stats()
  }

  /// Run `func` against the registry with the lock held.
  pub fn with_registry<R>(&self, func: impl FnOnce(&Registry) -> R) -> R {
    func(&self.lock_registry())
  }

  fn live_entries<'a, I>(&self, entries: I, count: usize) -> LiveSnapshot
  where
    I: IntoIterator<Item = (ObjectId, &'a Arc<str>)>,
  {
    let mut visible = entries
      .into_iter()
      .filter_map(|(object, type_name)| {
        let ref_count = self.inner.host.ref_count(object);

        // Mid-finalization: the count already dropped to zero but the
        // observer has not removed the entry yet.
        if ref_count == Some(0) {
          return None;
        }

        Some(LiveEntry {
          object,
          type_name: Arc::clone(type_name),
          ref_count,
        })
      })
      .collect::<Vec<_>>();

    visible.sort_by_key(|entry| entry.object);
    LiveSnapshot::new(visible, count)
  }

  /// Current live set, or `None` if the registry stayed busy.
  #[must_use]
  pub fn live_snapshot(&self) -> Option<LiveSnapshot> {
    let registry = self.try_lock_registry()?;
    Some(self.live_entries(registry.snapshot_live(), registry.live_len()))
  }

  fn dump(&self, reason: DumpReason) -> Option<LiveSnapshot> {
    let Some(snapshot) = self.live_snapshot() else {
      warn!(?reason, "registry busy, live dump skipped");
      self
        .inner
        .recorder
        .notice("gobject-list: registry busy, live dump skipped");
      return None;
    };

    self.inner.recorder.live(&snapshot, reason);
    Some(snapshot)
  }

  /// Print every live object.
  pub fn dump_live(&self) -> Option<LiveSnapshot> {
    self.dump(DumpReason::Requested)
  }

  /// Print the final report of objects that outlived the program.
  pub fn dump_still_alive(&self) -> Option<LiveSnapshot> {
    self.dump(DumpReason::StillAlive)
  }

  /// Take a checkpoint: print and clear what changed since the previous one.
  pub fn checkpoint(&self) -> Option<CheckpointReport> {
    let Some(mut registry) = self.try_lock_registry() else {
      warn!("registry busy, checkpoint skipped");
      self
        .inner
        .recorder
        .notice("gobject-list: registry busy, checkpoint skipped");
      return None;
    };

    let delta = registry.snapshot_and_clear_deltas();
    let added = self.live_entries(
      delta.added.iter().map(|(object, name)| (*object, name)),
      delta.added.len(),
    );
    drop(registry);

    let removed = delta
      .removed
      .into_iter()
      .map(|(object, type_name)| RemovedEntry { object, type_name })
      .collect();

    let report = CheckpointReport::new(delta.generation, added, removed);
    self.inner.recorder.checkpoint(&report);
    Some(report)
  }
}

impl Debug for Tracker {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    f.debug_struct("Tracker")
      .field("config", &self.inner.config)
      .field("display", &self.inner.display)
      .field("names", &self.inner.names)
      .field("recorder", &self.inner.recorder)
      .finish_non_exhaustive()
  }
}
