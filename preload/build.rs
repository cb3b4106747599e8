use std::env;

fn main() {
  println!("cargo:rerun-if-changed=csrc/g_object_new.c");

  if env::var("CARGO_CFG_TARGET_FAMILY").as_deref() != Ok("unix") {
    return;
  }

  cc::Build::new()
    .file("csrc/g_object_new.c")
    .warnings(true)
    .compile("gobject_list_new");
}
