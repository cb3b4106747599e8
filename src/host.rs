use super::*;

/// Callback run by the host exactly once when a tracked object is destroyed.
pub type FinalizeNotify = Box<dyn FnOnce(ObjectId) + Send + 'static>;

/// What the tracker needs from the object framework it observes.
///
/// Implementations never hand out ownership: the tracker only looks at objects
/// through their identity.
pub trait ObjectHost: Send + Sync {
  /// Type name of a live object.
  ///
  /// Must not be called once the object is being finalized.
  fn type_name(&self, object: ObjectId) -> Option<Arc<str>>;

  /// Current reference count. Advisory: it may race with other threads.
  fn ref_count(&self, object: ObjectId) -> Option<u32>;

  /// Attach a non-owning observer that fires once, when `object` is
  /// finalized and before its memory is released.
  ///
  /// `notify` must not be invoked from within this call.
  ///
  /// # Errors
  ///
  /// Returns an error if the framework refuses the observer.
  fn register_finalizer(
    &self,
    object: ObjectId,
    notify: FinalizeNotify,
  ) -> Result<(), TrackerError>;
}

struct SimulatedObject {
  type_name: Arc<str>,
  ref_count: u32,
  finalizers: Vec<FinalizeNotify>,
}

#[derive(Default)]
struct SimulatedInner {
  objects: IntMap<ObjectId, SimulatedObject>,
  free: Vec<usize>,
  next_address: usize,
  reuse_addresses: bool,
}

/// In-process reference counted object model.
///
/// Mirrors the parts of GObject the tracker relies on: creation hands out a
/// reference, the last unref runs the finalization observers with the count
/// already at zero, and only then is the address released. With address reuse
/// enabled, released addresses are handed out again, newest first, the way a
/// real allocator tends to.
pub struct SimulatedHost {
  inner: Mutex<SimulatedInner>,
}

impl Default for SimulatedHost {
  fn default() -> Self {
    Self::new()
  }
}

impl SimulatedHost {
  const ALIGN: usize = 0x10;

  #[must_use]
  pub fn new() -> Self {
    Self {
      inner: Mutex::new(SimulatedInner {
        next_address: 0x1000,
        ..SimulatedInner::default()
      }),
    }
  }

  #[must_use]
  pub fn with_address_reuse() -> Self {
    let host = Self::new();
    host.lock_inner().reuse_addresses = true;
    host
  }

  fn lock_inner(&self) -> MutexGuard<'_, SimulatedInner> {
    match self.inner.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  /// Allocate a new object holding one reference.
  pub fn allocate(&self, type_name: &str) -> ObjectId {
    let mut inner = self.lock_inner();

    let address = match inner.free.pop() {
      Some(address) if inner.reuse_addresses => address,
      _ => {
        let address = inner.next_address;
        inner.next_address = inner.next_address.saturating_add(Self::ALIGN);
        address
      }
    };

    let object = ObjectId::new(address);
    inner.objects.insert(object, SimulatedObject {
      type_name: Arc::from(type_name),
      ref_count: 1,
      finalizers: Vec::new(),
    });

    object
  }

  /// Allocate at a caller chosen address; `None` while it is still occupied.
  pub fn allocate_at(&self, address: usize, type_name: &str) -> Option<ObjectId> {
    let mut inner = self.lock_inner();
    let object = ObjectId::new(address);

    if inner.objects.contains_key(&object) {
      return None;
    }

    inner.free.retain(|free| *free != address);
    inner.objects.insert(object, SimulatedObject {
      type_name: Arc::from(type_name),
      ref_count: 1,
      finalizers: Vec::new(),
    });

    Some(object)
  }

  /// Take a reference, returning the count before the increment.
  pub fn ref_object(&self, object: ObjectId) -> Option<u32> {
    let mut inner = self.lock_inner();
    let entry = inner.objects.get_mut(&object)?;
    let before = entry.ref_count;
    entry.ref_count = entry.ref_count.saturating_add(1);
    Some(before)
  }

  /// Drop a reference, returning the count before the decrement.
  ///
  /// Dropping the last reference runs the finalization observers outside the
  /// host lock, then releases the address.
  pub fn unref_object(&self, object: ObjectId) -> Option<u32> {
    let finalizers = {
      let mut inner = self.lock_inner();
      let entry = inner.objects.get_mut(&object)?;
      let before = entry.ref_count;

      if before > 1 {
        entry.ref_count = before - 1;
        return Some(before);
      }

      entry.ref_count = 0;
      mem::take(&mut entry.finalizers)
    };

    for notify in finalizers {
      notify(object);
    }

    let mut inner = self.lock_inner();
    inner.objects.remove(&object);
    inner.free.push(object.address());

    Some(1)
  }

  #[must_use]
  pub fn live_objects(&self) -> usize {
    self.lock_inner().objects.len()
  }
}

impl ObjectHost for SimulatedHost {
  fn type_name(&self, object: ObjectId) -> Option<Arc<str>> {
    self
      .lock_inner()
      .objects
      .get(&object)
      .map(|entry| Arc::clone(&entry.type_name))
  }

  fn ref_count(&self, object: ObjectId) -> Option<u32> {
    self
      .lock_inner()
      .objects
      .get(&object)
      .map(|entry| entry.ref_count)
  }

  fn register_finalizer(
    &self,
    object: ObjectId,
    notify: FinalizeNotify,
  ) -> Result<(), TrackerError> {
    let mut inner = self.lock_inner();

    match inner.objects.get_mut(&object) {
      Some(entry) if entry.ref_count > 0 => {
        entry.finalizers.push(notify);
        Ok(())
      }
      Some(_) => Err(TrackerError::finalizer(object, "object is being finalized")),
      None => Err(TrackerError::finalizer(object, "unknown object")),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[test]
  fn last_unref_runs_finalizers_once() {
    let host = SimulatedHost::new();
    let object = host.allocate("GstBin");
    let fired = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&fired);
    host
      .register_finalizer(
        object,
        Box::new(move |_| {
          counter.fetch_add(1, Ordering::SeqCst);
        }),
      )
      .expect("registered");

    assert_eq!(host.ref_object(object), Some(1));
    assert_eq!(host.unref_object(object), Some(2));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    assert_eq!(host.unref_object(object), Some(1));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(host.unref_object(object), None);
    assert_eq!(host.live_objects(), 0);
  }

  #[test]
  fn ref_count_reads_zero_while_finalizing() {
    let host = Arc::new(SimulatedHost::new());
    let object = host.allocate("GstPad");
    let observed = Arc::new(Mutex::new(None));

    let (probe, slot) = (Arc::clone(&host), Arc::clone(&observed));
    host
      .register_finalizer(
        object,
        Box::new(move |object| {
          *slot.lock().expect("slot") = probe.ref_count(object);
        }),
      )
      .expect("registered");

    host.unref_object(object);
    assert_eq!(*observed.lock().expect("slot"), Some(0));
  }

  #[test]
  fn address_reuse_hands_back_released_addresses() {
    let host = SimulatedHost::with_address_reuse();
    let first = host.allocate("Foo");
    host.unref_object(first);

    let second = host.allocate("Bar");
    assert_eq!(first, second);
    assert_eq!(host.type_name(second).as_deref(), Some("Bar"));
  }

  #[test]
  fn allocate_at_refuses_occupied_addresses() {
    let host = SimulatedHost::new();
    assert!(host.allocate_at(0x40, "Foo").is_some());
    assert!(host.allocate_at(0x40, "Bar").is_none());
  }

  #[test]
  fn finalizer_registration_fails_for_unknown_objects() {
    let host = SimulatedHost::new();
    let result = host.register_finalizer(ObjectId::new(0x99), Box::new(|_| {}));
    assert!(matches!(result, Err(TrackerError::Finalizer { .. })));
  }
}
