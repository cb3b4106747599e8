//! Live-object table and the two checkpoint delta tables.
//!
//! The registry is plain data; callers serialize access through the tracker's
//! registry lock, so every method here runs with that lock held.

use {
  crate::event::ObjectId,
  nohash_hasher::{IntMap, IntSet},
  std::sync::Arc,
};

/// Result of recording a finalization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Finalized {
  pub type_name: Arc<str>,
  /// The object was created and destroyed within the current interval, so it
  /// was dropped from the added delta instead of entering the removed delta.
  pub transient: bool,
}

/// Contents of the delta tables taken at a checkpoint.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CheckpointDelta {
  /// Objects created since the previous checkpoint, still alive.
  pub added: Vec<(ObjectId, Arc<str>)>,
  /// Objects finalized since the previous checkpoint that were alive before it.
  pub removed: Vec<(ObjectId, Arc<str>)>,
  /// Generation that this delta closes.
  pub generation: u64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegistryStats {
  pub created: u64,
  pub finalized: u64,
  /// Creation events ignored because the identity was already live.
  pub duplicates: u64,
  /// Number of checkpoints taken so far.
  pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Registry {
  live: IntMap<ObjectId, Arc<str>>,
  added: IntSet<ObjectId>,
  removed: IntMap<ObjectId, Arc<str>>,
  stats: RegistryStats,
}

impl Registry {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Record a newly created object.
  ///
  /// Returns `false` without touching any table when the identity is already
  /// live.
  pub fn record_created(
    &mut self,
    object: ObjectId,
    type_name: Arc<str>,
  ) -> bool {
    if self.live.contains_key(&object) {
      self.stats.duplicates = self.stats.duplicates.saturating_add(1);
      return false;
    }

    self.live.insert(object, type_name);
    self.added.insert(object);
    self.stats.created = self.stats.created.saturating_add(1);
    true
  }

  /// Record that the framework destroyed `object`.
  ///
  /// Unknown identities are ignored.
  pub fn record_finalized(&mut self, object: ObjectId) -> Option<Finalized> {
    let type_name = self.live.remove(&object)?;
    self.stats.finalized = self.stats.finalized.saturating_add(1);

    let transient = self.added.remove(&object);

    if !transient {
      self.removed.insert(object, Arc::clone(&type_name));
    }

    Some(Finalized {
      type_name,
      transient,
    })
  }

  /// Drop a creation that could not be followed up with a finalizer.
  ///
  /// Leaves no trace in either delta and does not count as a finalization.
  pub fn forget(&mut self, object: ObjectId) -> bool {
    if self.live.remove(&object).is_none() {
      return false;
    }

    self.added.remove(&object);
    self.stats.created = self.stats.created.saturating_sub(1);
    true
  }

  /// Iterate over all live entries.
  pub fn snapshot_live(
    &self,
  ) -> impl ExactSizeIterator<Item = (ObjectId, &Arc<str>)> + '_ {
    self.live.iter().map(|(object, name)| (*object, name))
  }

  #[must_use]
  pub fn live_len(&self) -> usize {
    self.live.len()
  }

  #[must_use]
  pub fn is_live(&self, object: ObjectId) -> bool {
    self.live.contains_key(&object)
  }

  #[must_use]
  pub fn type_name(&self, object: ObjectId) -> Option<&Arc<str>> {
    self.live.get(&object)
  }

  /// Take and empty both delta tables, starting a new generation.
  pub fn snapshot_and_clear_deltas(&mut self) -> CheckpointDelta {
    let Self {
      live,
      added,
      removed,
      stats,
    } = self;

    let mut added = added
      .drain()
      .filter_map(|object| {
        live.get(&object).map(|name| (object, Arc::clone(name)))
      })
      .collect::<Vec<_>>();

    let mut removed = removed.drain().collect::<Vec<_>>();

    added.sort_by_key(|(object, _)| *object);
    removed.sort_by_key(|(object, _)| *object);

    let generation = stats.generation;
    stats.generation = stats.generation.saturating_add(1);

    CheckpointDelta {
      added,
      removed,
      generation,
    }
  }

  #[must_use]
  pub fn stats(&self) -> RegistryStats {
    self.stats
  }

  #[must_use]
  pub fn added_len(&self) -> usize {
    self.added.len()
  }

  #[must_use]
  pub fn removed_len(&self) -> usize {
    self.removed.len()
  }

  /// Whether every identity in the added delta is also live.
  #[must_use]
  pub fn added_within_live(&self) -> bool {
    self.added.iter().all(|object| self.live.contains_key(object))
  }
}
