//! Layouts and entry points of the GLib and GStreamer symbols we forward to.

use {
  libc::{c_char, c_int, c_uint, c_void},
  libloading::Library,
  std::sync::atomic::{AtomicI32, AtomicU32},
  thiserror::Error,
};

pub type GType = usize;
pub type Gpointer = *mut c_void;

pub const GOBJECT_LIBRARY: &str = "libgobject-2.0.so.0";
pub const GSTREAMER_LIBRARY: &str = "libgstreamer-1.0.so.0";

#[repr(C)]
pub struct GTypeClass {
  pub g_type: GType,
}

#[repr(C)]
pub struct GTypeInstance {
  pub g_class: *mut GTypeClass,
}

/// Public prefix of `GObject`.
#[repr(C)]
pub struct GObject {
  pub g_type_instance: GTypeInstance,
  pub ref_count: AtomicU32,
  pub qdata: Gpointer,
}

/// Public prefix of `GstMiniObject`.
#[repr(C)]
pub struct GstMiniObject {
  pub type_: GType,
  pub refcount: AtomicI32,
  pub lockstate: c_int,
  pub flags: c_uint,
}

#[repr(C)]
pub struct GValue {
  _private: [u8; 0],
}

#[repr(C)]
pub struct GParameter {
  _private: [u8; 0],
}

#[repr(C)]
pub struct GstAllocator {
  _private: [u8; 0],
}

#[repr(C)]
pub struct GstAllocationParams {
  _private: [u8; 0],
}

pub type GWeakNotify = unsafe extern "C" fn(data: Gpointer, object: *mut GObject);
pub type GstMiniObjectNotify =
  unsafe extern "C" fn(data: Gpointer, object: *mut GstMiniObject);
pub type GDestroyNotify = Option<unsafe extern "C" fn(data: Gpointer)>;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("unable to open {name}: {source}")]
  Library {
    name: &'static str,
    #[source]
    source: libloading::Error,
  },
  #[error("unable to resolve {name}: {source}")]
  Symbol {
    name: &'static str,
    #[source]
    source: libloading::Error,
  },
  #[error("{name} is not available in this process")]
  Unavailable { name: &'static str },
}

fn open(name: &'static str) -> Result<Library, LoadError> {
  // SAFETY: both libraries are already mapped into any process calling into
  // them; opening them again only bumps their reference count.
  unsafe { Library::new(name) }.map_err(|source| LoadError::Library { name, source })
}

/// Resolve `name` in `library`, bypassing our own interposed definition.
///
/// # Safety
///
/// `T` must be the exact function pointer type of the symbol.
unsafe fn resolve<T: Copy>(
  library: &Library,
  name: &'static str,
) -> Result<T, LoadError> {
  library
    .get::<T>(name.as_bytes())
    .map(|symbol| *symbol)
    .map_err(|source| LoadError::Symbol { name, source })
}

/// The real GObject functions.
pub struct GObjectApi {
  pub new_with_properties: unsafe extern "C" fn(
    GType,
    c_uint,
    *const *const c_char,
    *const GValue,
  ) -> *mut GObject,
  pub newv: unsafe extern "C" fn(GType, c_uint, *mut GParameter) -> Gpointer,
  /// `g_object_new_valist`, only ever called from C where `va_list` exists.
  pub new_valist: unsafe extern "C" fn(),
  pub object_ref: unsafe extern "C" fn(Gpointer) -> Gpointer,
  pub object_unref: unsafe extern "C" fn(Gpointer),
  pub weak_ref: unsafe extern "C" fn(*mut GObject, GWeakNotify, Gpointer),
  pub type_name: unsafe extern "C" fn(GType) -> *const c_char,
  _library: Library,
}

impl GObjectApi {
  pub fn load() -> Result<Self, LoadError> {
    let library = open(GOBJECT_LIBRARY)?;

    // SAFETY: the pointer types match the GObject 2.x declarations.
    unsafe {
      Ok(Self {
        new_with_properties: resolve(&library, "g_object_new_with_properties")?,
        newv: resolve(&library, "g_object_newv")?,
        new_valist: resolve(&library, "g_object_new_valist")?,
        object_ref: resolve(&library, "g_object_ref")?,
        object_unref: resolve(&library, "g_object_unref")?,
        weak_ref: resolve(&library, "g_object_weak_ref")?,
        type_name: resolve(&library, "g_type_name")?,
        _library: library,
      })
    }
  }
}

/// The real GStreamer functions.
pub struct GstApi {
  pub buffer_new: unsafe extern "C" fn() -> *mut GstMiniObject,
  pub buffer_new_allocate: unsafe extern "C" fn(
    *mut GstAllocator,
    usize,
    *mut GstAllocationParams,
  ) -> *mut GstMiniObject,
  pub buffer_new_wrapped_full: unsafe extern "C" fn(
    c_uint,
    Gpointer,
    usize,
    usize,
    usize,
    Gpointer,
    GDestroyNotify,
  ) -> *mut GstMiniObject,
  pub mini_object_ref:
    unsafe extern "C" fn(*mut GstMiniObject) -> *mut GstMiniObject,
  pub mini_object_unref: unsafe extern "C" fn(*mut GstMiniObject),
  pub mini_object_weak_ref:
    unsafe extern "C" fn(*mut GstMiniObject, GstMiniObjectNotify, Gpointer),
  _library: Library,
}

impl GstApi {
  pub fn load() -> Result<Self, LoadError> {
    let library = open(GSTREAMER_LIBRARY)?;

    // SAFETY: the pointer types match the GStreamer 1.x declarations.
    unsafe {
      Ok(Self {
        buffer_new: resolve(&library, "gst_buffer_new")?,
        buffer_new_allocate: resolve(&library, "gst_buffer_new_allocate")?,
        buffer_new_wrapped_full: resolve(
          &library,
          "gst_buffer_new_wrapped_full",
        )?,
        mini_object_ref: resolve(&library, "gst_mini_object_ref")?,
        mini_object_unref: resolve(&library, "gst_mini_object_unref")?,
        mini_object_weak_ref: resolve(&library, "gst_mini_object_weak_ref")?,
        _library: library,
      })
    }
  }
}
