use super::*;

/// One live object as seen by a dump.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LiveEntry {
  pub object: ObjectId,
  pub type_name: Arc<str>,
  /// Advisory; `None` when the host could not tell.
  pub ref_count: Option<u32>,
}

/// Why a live dump was taken.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DumpReason {
  Requested,
  StillAlive,
}

/// Immutable view of the live set at one point in time.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LiveSnapshot {
  entries: Vec<LiveEntry>,
  /// Size of the live set, including skipped entries.
  count: usize,
  /// Entries left out because their object was mid-destruction.
  skipped: usize,
}

impl LiveSnapshot {
  #[must_use]
  pub(crate) fn new(entries: Vec<LiveEntry>, count: usize) -> Self {
    let skipped = count.saturating_sub(entries.len());
    Self {
      entries,
      count,
      skipped,
    }
  }

  #[must_use]
  pub fn entries(&self) -> &[LiveEntry] {
    &self.entries
  }

  #[must_use]
  pub fn count(&self) -> usize {
    self.count
  }

  #[must_use]
  pub fn skipped(&self) -> usize {
    self.skipped
  }

  #[must_use]
  pub fn contains(&self, object: ObjectId) -> bool {
    self.entries.iter().any(|entry| entry.object == object)
  }
}

/// An object finalized during the closed interval.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RemovedEntry {
  pub object: ObjectId,
  /// Captured when the object was created.
  pub type_name: Arc<str>,
}

/// What changed between two checkpoints.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CheckpointReport {
  generation: u64,
  added: LiveSnapshot,
  removed: Vec<RemovedEntry>,
}

impl CheckpointReport {
  #[must_use]
  pub(crate) fn new(
    generation: u64,
    added: LiveSnapshot,
    removed: Vec<RemovedEntry>,
  ) -> Self {
    Self {
      generation,
      added,
      removed,
    }
  }

  #[must_use]
  pub fn generation(&self) -> u64 {
    self.generation
  }

  #[must_use]
  pub fn added(&self) -> &LiveSnapshot {
    &self.added
  }

  #[must_use]
  pub fn removed(&self) -> &[RemovedEntry] {
    &self.removed
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.added.count() == 0 && self.removed.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn skipped_is_the_difference_between_count_and_entries() {
    let entry = LiveEntry {
      object: ObjectId::new(0x10),
      type_name: Arc::from("GstPad"),
      ref_count: Some(1),
    };
    let snapshot = LiveSnapshot::new(vec![entry], 3);

    assert_eq!(snapshot.count(), 3);
    assert_eq!(snapshot.skipped(), 2);
    assert!(snapshot.contains(ObjectId::new(0x10)));
  }

  #[test]
  fn report_serializes_removed_type_names() {
    let report = CheckpointReport::new(
      4,
      LiveSnapshot::default(),
      vec![RemovedEntry {
        object: ObjectId::new(0x20),
        type_name: Arc::from("GstBuffer"),
      }],
    );

    let value = serde_json::to_value(&report).expect("serializable report");
    assert_eq!(value["generation"], 4);
    assert_eq!(value["removed"][0]["object"], "0x20");
    assert_eq!(value["removed"][0]["type_name"], "GstBuffer");
    assert_eq!(value["added"]["count"], 0);
  }
}
