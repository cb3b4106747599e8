use {
  crate::ffi::{GObject, GObjectApi, GType, Gpointer, GstApi, GstMiniObject},
  dashmap::DashMap,
  gobject_list::{FinalizeNotify, ObjectHost, ObjectId, TrackerError},
  std::{
    ffi::CStr,
    sync::{Arc, OnceLock, atomic::Ordering},
  },
};

/// Which of the two reference counting schemes an identity belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectKind {
  Object,
  MiniObject,
}

#[derive(Clone, Copy, Debug)]
struct Noted {
  kind: ObjectKind,
  tracked: bool,
}

/// Kind of every identity the intercepted calls are currently looking at.
///
/// An entry lives for one intercepted call, unless a finalization observer
/// was attached to its object: then it lives until that observer runs.
#[derive(Debug, Default)]
pub struct KindTable {
  entries: DashMap<ObjectId, Noted>,
}

impl KindTable {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn note(&self, object: ObjectId, kind: ObjectKind) {
    self
      .entries
      .entry(object)
      .and_modify(|noted| noted.kind = kind)
      .or_insert(Noted {
        kind,
        tracked: false,
      });
  }

  #[must_use]
  pub fn kind(&self, object: ObjectId) -> Option<ObjectKind> {
    self.entries.get(&object).map(|noted| noted.kind)
  }

  #[must_use]
  pub fn is_tracked(&self, object: ObjectId) -> bool {
    self.entries.get(&object).is_some_and(|noted| noted.tracked)
  }

  fn mark_tracked(&self, object: ObjectId) {
    if let Some(mut noted) = self.entries.get_mut(&object) {
      noted.tracked = true;
    }
  }

  /// Drop `object` unless a finalization observer still needs its kind.
  pub fn release_untracked(&self, object: ObjectId) {
    self.entries.remove_if(&object, |_, noted| !noted.tracked);
  }

  pub fn finalized(&self, object: ObjectId) {
    self.entries.remove(&object);
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// [`ObjectHost`] backed by the real GLib and GStreamer libraries.
///
/// The intercepted entry points tell the host what kind of object an identity
/// is before the tracker asks about it.
pub struct GlibHost {
  gobject: &'static GObjectApi,
  gst: &'static OnceLock<Option<GstApi>>,
  kinds: Arc<KindTable>,
  names: DashMap<GType, Arc<str>>,
}

impl GlibHost {
  #[must_use]
  pub fn new(
    gobject: &'static GObjectApi,
    gst: &'static OnceLock<Option<GstApi>>,
  ) -> Self {
    Self {
      gobject,
      gst,
      kinds: Arc::new(KindTable::new()),
      names: DashMap::new(),
    }
  }

  pub fn note(&self, object: ObjectId, kind: ObjectKind) {
    self.kinds.note(object, kind);
  }

  /// Forget `object` after an intercepted call unless it is tracked.
  pub fn release_untracked(&self, object: ObjectId) {
    self.kinds.release_untracked(object);
  }

  fn kind(&self, object: ObjectId) -> Option<ObjectKind> {
    self.kinds.kind(object)
  }

  fn type_of(&self, object: ObjectId, kind: ObjectKind) -> GType {
    // SAFETY: `object` is live; both layouts start with what we read here.
    unsafe {
      match kind {
        ObjectKind::Object => {
          let object = object.as_ptr::<GObject>();
          let class = (*object).g_type_instance.g_class;

          if class.is_null() {
            0
          } else {
            (*class).g_type
          }
        }
        ObjectKind::MiniObject => (*object.as_ptr::<GstMiniObject>()).type_,
      }
    }
  }

  fn name_of(&self, gtype: GType) -> Option<Arc<str>> {
    if gtype == 0 {
      return None;
    }

    if let Some(name) = self.names.get(&gtype) {
      return Some(Arc::clone(&name));
    }

    // SAFETY: `g_type_name` returns a static string or null.
    let raw = unsafe { (self.gobject.type_name)(gtype) };

    if raw.is_null() {
      return None;
    }

    // SAFETY: checked non-null above; GLib type names are NUL terminated.
    let name: Arc<str> =
      Arc::from(unsafe { CStr::from_ptr(raw) }.to_string_lossy());

    self.names.insert(gtype, Arc::clone(&name));
    Some(name)
  }
}

impl ObjectHost for GlibHost {
  fn type_name(&self, object: ObjectId) -> Option<Arc<str>> {
    let kind = self.kind(object)?;
    self.name_of(self.type_of(object, kind))
  }

  fn ref_count(&self, object: ObjectId) -> Option<u32> {
    // SAFETY: only called for registered objects, under the registry lock
    // that keeps their finalization from completing.
    unsafe {
      match self.kind(object)? {
        ObjectKind::Object => Some(
          (*object.as_ptr::<GObject>())
            .ref_count
            .load(Ordering::Relaxed),
        ),
        ObjectKind::MiniObject => {
          let count = (*object.as_ptr::<GstMiniObject>())
            .refcount
            .load(Ordering::Relaxed);
          Some(u32::try_from(count).unwrap_or(0))
        }
      }
    }
  }

  fn register_finalizer(
    &self,
    object: ObjectId,
    notify: FinalizeNotify,
  ) -> Result<(), TrackerError> {
    let kind = self
      .kind(object)
      .ok_or_else(|| TrackerError::finalizer(object, "unknown object kind"))?;

    let kinds = Arc::clone(&self.kinds);
    let notify: FinalizeNotify = Box::new(move |object| {
      notify(object);
      kinds.finalized(object);
    });

    let data = Box::into_raw(Box::new(notify)).cast::<std::ffi::c_void>();

    match kind {
      ObjectKind::Object => {
        // SAFETY: `object` is a live GObject; `data` is reclaimed exactly once
        // by the trampoline.
        unsafe {
          (self.gobject.weak_ref)(object.as_ptr(), object_finalized, data);
        }
      }
      ObjectKind::MiniObject => {
        let Some(gst) = self.gst.get().and_then(Option::as_ref) else {
          // SAFETY: never handed out, reclaim it here.
          drop(unsafe { Box::from_raw(data.cast::<FinalizeNotify>()) });
          return Err(TrackerError::finalizer(object, "gstreamer not loaded"));
        };

        // SAFETY: as above, for a live mini object.
        unsafe {
          (gst.mini_object_weak_ref)(object.as_ptr(), mini_object_finalized, data);
        }
      }
    }

    self.kinds.mark_tracked(object);
    Ok(())
  }
}

unsafe fn run_notify(data: Gpointer, object: ObjectId) {
  let notify = Box::from_raw(data.cast::<FinalizeNotify>());
  (*notify)(object);
}

unsafe extern "C" fn object_finalized(data: Gpointer, object: *mut GObject) {
  run_notify(data, ObjectId::from_ptr(object));
}

unsafe extern "C" fn mini_object_finalized(
  data: Gpointer,
  object: *mut GstMiniObject,
) {
  run_notify(data, ObjectId::from_ptr(object));
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn untracked_identities_last_one_call() {
    let table = KindTable::new();
    let object = ObjectId::new(0x10);

    table.note(object, ObjectKind::Object);
    assert_eq!(table.kind(object), Some(ObjectKind::Object));
    assert!(!table.is_tracked(object));

    table.release_untracked(object);
    assert_eq!(table.kind(object), None);
    assert!(table.is_empty());
  }

  #[test]
  fn tracked_identities_live_until_finalized() {
    let table = KindTable::new();
    let object = ObjectId::new(0x20);

    table.note(object, ObjectKind::MiniObject);
    table.mark_tracked(object);

    table.note(object, ObjectKind::MiniObject);
    table.release_untracked(object);
    assert!(table.is_tracked(object));
    assert_eq!(table.kind(object), Some(ObjectKind::MiniObject));

    table.finalized(object);
    assert!(!table.is_tracked(object));
    assert_eq!(table.len(), 0);
  }

  #[test]
  fn marking_an_unnoted_identity_does_nothing() {
    let table = KindTable::new();
    let object = ObjectId::new(0x30);

    table.mark_tracked(object);
    assert!(!table.is_tracked(object));
    assert!(table.is_empty());
  }
}
