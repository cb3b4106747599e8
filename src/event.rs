use super::*;

/// Identity of a tracked object: its address at the time it was observed.
///
/// Only unique while creation and finalization are serialized against each
/// other; the allocator is free to hand the same address to a new object once
/// the old one is gone.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId(usize);

impl ObjectId {
  #[must_use]
  pub const fn new(address: usize) -> Self {
    Self(address)
  }

  #[must_use]
  pub fn from_ptr<T>(ptr: *const T) -> Self {
    Self(ptr as usize)
  }

  #[must_use]
  pub const fn address(self) -> usize {
    self.0
  }

  #[must_use]
  pub fn as_ptr<T>(self) -> *mut T {
    self.0 as *mut T
  }
}

impl nohash_hasher::IsEnabled for ObjectId {}

impl Display for ObjectId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{:#x}", self.0)
  }
}

impl Serialize for ObjectId {
  fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.collect_str(self)
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventKind {
  Created,
  Reffed { before: u32, after: u32 },
  Unreffed { before: u32, after: u32 },
  Finalized,
}

/// A single traced lifetime event, ready to be handed to the recorder.
#[derive(Clone, Debug, Serialize)]
pub struct TraceEvent {
  #[serde(flatten)]
  pub kind: EventKind,
  pub object: ObjectId,
  pub type_name: Arc<str>,
}

impl TraceEvent {
  #[must_use]
  pub fn new(kind: EventKind, object: ObjectId, type_name: Arc<str>) -> Self {
    Self {
      kind,
      object,
      type_name,
    }
  }

  #[must_use]
  pub fn reffed(object: ObjectId, type_name: Arc<str>, before: u32) -> Self {
    let after = before.saturating_add(1);
    Self::new(EventKind::Reffed { before, after }, object, type_name)
  }

  #[must_use]
  pub fn unreffed(object: ObjectId, type_name: Arc<str>, before: u32) -> Self {
    let after = before.saturating_sub(1);
    Self::new(EventKind::Unreffed { before, after }, object, type_name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn object_ids_display_as_hex_addresses() {
    assert_eq!(ObjectId::new(0xdead_beef).to_string(), "0xdeadbeef");
  }

  #[test]
  fn unref_from_zero_does_not_underflow() {
    let event = TraceEvent::unreffed(ObjectId::new(1), Arc::from("GstPad"), 0);
    assert_eq!(event.kind, EventKind::Unreffed { before: 0, after: 0 });
  }

  #[test]
  fn events_serialize_with_kind_tag() {
    let event =
      TraceEvent::reffed(ObjectId::new(0x10), Arc::from("GstElement"), 1);
    let value = serde_json::to_value(&event).expect("serializable event");

    assert_eq!(value["kind"], "reffed");
    assert_eq!(value["before"], 1);
    assert_eq!(value["after"], 2);
    assert_eq!(value["object"], "0x10");
    assert_eq!(value["type_name"], "GstElement");
  }
}
