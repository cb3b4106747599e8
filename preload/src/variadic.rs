//! `g_object_new`, whose variadic arguments only C can forward.
//!
//! The exported symbol is a naked function jumping to the C half in
//! `csrc/g_object_new.c`, which collects the arguments into a `va_list`,
//! calls the real `g_object_new_valist` and reports the new object back here.

use {
  crate::{
    created,
    ffi::{GObject, GType, Gpointer},
    gobject, ObjectKind,
  },
  gobject_list::ObjectId,
  libc::c_char,
};

extern "C" {
  fn gobject_list_g_object_new(
    object_type: GType,
    first_property_name: *const c_char,
    ...
  ) -> *mut GObject;
}

#[cfg(target_arch = "x86_64")]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn g_object_new(
  object_type: GType,
  first_property_name: *const c_char,
) -> *mut GObject {
  core::arch::naked_asm!(
    "jmp {new}",
    new = sym gobject_list_g_object_new,
  )
}

#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn g_object_new(
  object_type: GType,
  first_property_name: *const c_char,
) -> *mut GObject {
  core::arch::naked_asm!(
    "b {new}",
    new = sym gobject_list_g_object_new,
  )
}

/// The real `g_object_new_valist`, as an untyped pointer for the C half.
#[no_mangle]
pub extern "C" fn gobject_list_real_new_valist() -> Gpointer {
  gobject().new_valist as Gpointer
}

#[no_mangle]
pub extern "C" fn gobject_list_object_created(object: Gpointer) {
  created(ObjectId::from_ptr(object), ObjectKind::Object);
}

#[cfg(test)]
mod tests {
  use {
    super::*,
    crate::{
      ffi::{GOBJECT_LIBRARY, GObjectApi},
      runtime,
    },
    libloading::Library,
    std::ptr,
  };

  extern "C" {
    #[link_name = "g_object_new"]
    fn interposed_object_new(
      object_type: GType,
      first_property_name: *const c_char,
      ...
    ) -> *mut GObject;
  }

  #[test]
  fn variadic_creation_is_tracked_until_finalized() {
    if let Err(err) = GObjectApi::load() {
      eprintln!("skipping, {err}");
      return;
    }

    // SAFETY: loaded successfully above.
    let library = unsafe { Library::new(GOBJECT_LIBRARY) }.expect("gobject");

    // SAFETY: `g_object_get_type` takes nothing and returns a GType.
    let object_type = unsafe {
      let get_type = library
        .get::<unsafe extern "C" fn() -> GType>(b"g_object_get_type")
        .expect("g_object_get_type");
      get_type()
    };

    // SAFETY: a plain GObject with an empty property list.
    let object = unsafe { interposed_object_new(object_type, ptr::null()) };
    assert!(!object.is_null());

    let id = ObjectId::from_ptr(object);
    assert!(runtime().tracker.is_tracked(id));

    // SAFETY: the only reference, taken by the creation above.
    unsafe { (gobject().object_unref)(object.cast()) };
    assert!(!runtime().tracker.is_tracked(id));
  }
}
