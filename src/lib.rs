//! Object lifetime tracker for reference counted object frameworks.
//!
//! The tracker keeps a registry of live objects, traces their creation,
//! reference changes and finalization, and answers asynchronous requests for
//! live dumps and checkpoint deltas. The framework itself is reached through
//! [`ObjectHost`]; the `gobject-list-preload` crate implements it for GLib and
//! GStreamer, [`SimulatedHost`] implements it in process.

mod config;
mod dispatch;
mod error;
mod event;
mod export;
mod filter;
mod host;
mod lock;
mod recorder;
mod registry;
#[cfg(unix)]
pub mod signals;
mod snapshot;
mod stack_capture;
mod state;

use {
  backtrace::{Frame, SymbolName},
  crossbeam_queue::ArrayQueue,
  lock::{try_lock_for, write_stderr_raw},
  nohash_hasher::IntMap,
  serde::{Serialize, Serializer},
  stack_capture::StackCollector,
  std::{
    env,
    ffi::OsStr,
    fmt::{self, Debug, Display, Formatter},
    hint,
    io::{self, Write},
    mem,
    path::Path,
    sync::{
      Arc, Mutex, MutexGuard, TryLockError,
      atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
  },
  tracing::{debug, warn},
};

pub use {
  config::{
    BACKTRACE_DEPTH_VAR, ConfigSource, DISPLAY_VAR, FILTER_VAR, FORMAT_VAR,
    OutputFormat, PROPAGATE_VAR, TrackerConfig,
  },
  dispatch::{Delivery, Dispatcher, Trigger},
  error::TrackerError,
  event::{EventKind, ObjectId, TraceEvent},
  export::{JsonLinesWriter, ReportWriter, SharedBuffer, TextWriter},
  filter::{DisplayFilter, DisplayFlags, NameFilter},
  host::{FinalizeNotify, ObjectHost, SimulatedHost},
  recorder::{OUTPUT_BUSY, Recorder, program_name},
  registry::{CheckpointDelta, Finalized, Registry, RegistryStats},
  snapshot::{
    CheckpointReport, DumpReason, LiveEntry, LiveSnapshot, RemovedEntry,
  },
  stack_capture::FrameMetadata,
  state::{Tracker, TrackerBuilder},
};
