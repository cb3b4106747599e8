//! `LD_PRELOAD` library interposing GLib and GStreamer object entry points.
//!
//! ```text
//! LD_PRELOAD=libgobject_list_preload.so gst-launch-1.0 ...
//! kill -USR1 <pid>   # live objects
//! kill -USR2 <pid>   # objects added and removed since the last checkpoint
//! ```
//!
//! Objects are seen at creation through `g_object_new`,
//! `g_object_new_with_properties`, `g_object_newv` and the `gst_buffer_new*`
//! family. `g_object_new` is interposed on x86_64 and aarch64 only, where a
//! naked jump can hand its variadic arguments to C untouched.

#![allow(clippy::missing_safety_doc)]

mod ffi;
mod host;
#[cfg(all(unix, any(target_arch = "x86_64", target_arch = "aarch64")))]
mod variadic;

use {
  ffi::{
    GDestroyNotify, GObject, GObjectApi, GParameter, GType, GValue, Gpointer,
    GstAllocationParams, GstAllocator, GstApi, GstMiniObject,
  },
  gobject_list::{ObjectHost, ObjectId, Tracker, TrackerConfig},
  libc::{c_char, c_uint},
  std::{cell::Cell, env, io, process, sync::Arc, sync::OnceLock},
  tracing::{debug, error, warn},
  tracing_subscriber::EnvFilter,
};

pub use {
  ffi::LoadError,
  host::{GlibHost, KindTable, ObjectKind},
};

/// Filter for the preload library's own diagnostics.
pub const LOG_VAR: &str = "GOBJECT_LIST_LOG";

static GOBJECT: OnceLock<GObjectApi> = OnceLock::new();
static GST: OnceLock<Option<GstApi>> = OnceLock::new();
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

thread_local! {
  static IN_TRACKER: Cell<bool> = const { Cell::new(false) };
}

struct Runtime {
  host: Arc<GlibHost>,
  tracker: Tracker,
}

impl Runtime {
  /// Tracked objects keep their kind until finalized, others only for the
  /// duration of one intercepted call.
  fn release_untracked(&self, object: ObjectId) {
    self.host.release_untracked(object);
  }
}

/// Run `func` unless this thread is already inside the tracker.
fn with_guard<F, R>(func: F) -> Option<R>
where
  F: FnOnce() -> R,
{
  IN_TRACKER
    .try_with(|flag| {
      if flag.get() {
        return None;
      }

      flag.set(true);

      struct Reset<'a>(&'a Cell<bool>);

      impl Drop for Reset<'_> {
        fn drop(&mut self) {
          self.0.set(false);
        }
      }

      let _reset = Reset(flag);

      Some(func())
    })
    .ok()
    .flatten()
}

fn fatal(err: &LoadError) -> ! {
  error!(%err, "gobject-list cannot forward intercepted calls");
  eprintln!("gobject-list: {err}");
  process::abort()
}

fn gobject() -> &'static GObjectApi {
  GOBJECT.get_or_init(|| GObjectApi::load().unwrap_or_else(|err| fatal(&err)))
}

fn gst() -> &'static GstApi {
  let api = GST.get_or_init(|| match GstApi::load() {
    Ok(api) => Some(api),
    Err(err) => {
      warn!(%err, "gstreamer entry points unavailable");
      None
    }
  });

  match api {
    Some(api) => api,
    None => fatal(&LoadError::Unavailable {
      name: ffi::GSTREAMER_LIBRARY,
    }),
  }
}

fn init_logging() {
  let filter = EnvFilter::try_from_env(LOG_VAR)
    .unwrap_or_else(|_| EnvFilter::new("warn"));

  // Another subscriber may already be installed by the host program.
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

fn runtime() -> &'static Runtime {
  RUNTIME.get_or_init(|| {
    init_logging();

    let config = TrackerConfig::from_env();
    let propagate = config.propagate_preload;

    let host = Arc::new(GlibHost::new(gobject(), &GST));
    let tracker = Tracker::builder()
      .with_config(config)
      .finish(Arc::clone(&host) as Arc<dyn ObjectHost>);

    if let Err(err) = gobject_list::signals::install(tracker.clone()) {
      warn!(%err, "introspection signals unavailable");
    }

    if !propagate {
      env::remove_var("LD_PRELOAD");
    }

    debug!(program = tracker.program(), "gobject-list initialized");
    Runtime { host, tracker }
  })
}

fn created(object: ObjectId, kind: ObjectKind) {
  if object.address() == 0 {
    return;
  }

  with_guard(|| {
    let runtime = runtime();
    runtime.host.note(object, kind);

    runtime.tracker.object_created(object);
    runtime.release_untracked(object);
  });
}

fn reffed(object: ObjectId, kind: ObjectKind) {
  with_guard(|| {
    let runtime = runtime();
    runtime.host.note(object, kind);

    if let Some(before) = runtime.host.ref_count(object) {
      runtime.tracker.object_reffed(object, before);
    }

    runtime.release_untracked(object);
  });
}

fn unreffed(object: ObjectId, kind: ObjectKind) {
  with_guard(|| {
    let runtime = runtime();
    runtime.host.note(object, kind);

    if let Some(before) = runtime.host.ref_count(object) {
      runtime.tracker.object_unreffed(object, before);
    }

    runtime.release_untracked(object);
  });
}

#[no_mangle]
pub unsafe extern "C" fn g_object_new_with_properties(
  object_type: GType,
  n_properties: c_uint,
  names: *const *const c_char,
  values: *const GValue,
) -> *mut GObject {
  let object =
    (gobject().new_with_properties)(object_type, n_properties, names, values);
  created(ObjectId::from_ptr(object), ObjectKind::Object);
  object
}

#[no_mangle]
pub unsafe extern "C" fn g_object_newv(
  object_type: GType,
  n_parameters: c_uint,
  parameters: *mut GParameter,
) -> Gpointer {
  let object = (gobject().newv)(object_type, n_parameters, parameters);
  created(ObjectId::from_ptr(object), ObjectKind::Object);
  object
}

#[no_mangle]
pub unsafe extern "C" fn g_object_ref(object: Gpointer) -> Gpointer {
  if !object.is_null() {
    reffed(ObjectId::from_ptr(object), ObjectKind::Object);
  }

  (gobject().object_ref)(object)
}

#[no_mangle]
pub unsafe extern "C" fn g_object_unref(object: Gpointer) {
  if !object.is_null() {
    unreffed(ObjectId::from_ptr(object), ObjectKind::Object);
  }

  (gobject().object_unref)(object);
}

#[no_mangle]
pub unsafe extern "C" fn gst_buffer_new() -> *mut GstMiniObject {
  let buffer = (gst().buffer_new)();
  created(ObjectId::from_ptr(buffer), ObjectKind::MiniObject);
  buffer
}

#[no_mangle]
pub unsafe extern "C" fn gst_buffer_new_allocate(
  allocator: *mut GstAllocator,
  size: usize,
  params: *mut GstAllocationParams,
) -> *mut GstMiniObject {
  let buffer = (gst().buffer_new_allocate)(allocator, size, params);
  created(ObjectId::from_ptr(buffer), ObjectKind::MiniObject);
  buffer
}

#[no_mangle]
pub unsafe extern "C" fn gst_buffer_new_wrapped_full(
  flags: c_uint,
  data: Gpointer,
  maxsize: usize,
  offset: usize,
  size: usize,
  user_data: Gpointer,
  notify: GDestroyNotify,
) -> *mut GstMiniObject {
  let buffer = (gst().buffer_new_wrapped_full)(
    flags, data, maxsize, offset, size, user_data, notify,
  );
  created(ObjectId::from_ptr(buffer), ObjectKind::MiniObject);
  buffer
}

#[no_mangle]
pub unsafe extern "C" fn gst_mini_object_ref(
  object: *mut GstMiniObject,
) -> *mut GstMiniObject {
  if !object.is_null() {
    reffed(ObjectId::from_ptr(object), ObjectKind::MiniObject);
  }

  (gst().mini_object_ref)(object)
}

#[no_mangle]
pub unsafe extern "C" fn gst_mini_object_unref(object: *mut GstMiniObject) {
  if !object.is_null() {
    unreffed(ObjectId::from_ptr(object), ObjectKind::MiniObject);
  }

  (gst().mini_object_unref)(object);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guard_blocks_reentry_on_the_same_thread() {
    let outer = with_guard(|| with_guard(|| ()).is_none());
    assert_eq!(outer, Some(true));
    assert_eq!(with_guard(|| 7), Some(7));
  }

  #[test]
  fn guard_is_per_thread() {
    let nested = with_guard(|| {
      std::thread::spawn(|| with_guard(|| ()).is_some())
        .join()
        .expect("guard thread")
    });
    assert_eq!(nested, Some(true));
  }
}
