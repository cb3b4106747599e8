//! Process-wide glue between POSIX signals, the exit hook and the dispatcher.
//!
//! C signal handlers carry no context, so the installed dispatcher lives in a
//! static. Everything else takes the tracker explicitly.

use {
  crate::{
    dispatch::{Dispatcher, Trigger},
    error::TrackerError,
    state::Tracker,
  },
  libc::c_int,
  std::{io, mem, ptr, sync::OnceLock},
  tracing::{debug, warn},
};

/// Requests a live dump.
pub const DUMP_SIGNAL: c_int = libc::SIGUSR1;

/// Requests a checkpoint.
pub const CHECKPOINT_SIGNAL: c_int = libc::SIGUSR2;

/// Print the final report, then terminate the default way.
pub const TERMINATING_SIGNALS: [c_int; 4] =
  [libc::SIGINT, libc::SIGTERM, libc::SIGABRT, libc::SIGSEGV];

static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

/// Install the signal handlers and the exit hook for `tracker`.
///
/// # Errors
///
/// Returns [`TrackerError::AlreadyInstalled`] on every call after the first,
/// and [`TrackerError::Signal`] if a handler cannot be installed.
pub fn install(tracker: Tracker) -> Result<&'static Dispatcher, TrackerError> {
  let mut fresh = false;

  let dispatcher = DISPATCHER.get_or_init(|| {
    fresh = true;
    Dispatcher::new(tracker)
  });

  if !fresh {
    return Err(TrackerError::AlreadyInstalled);
  }

  set_handler(DUMP_SIGNAL)?;
  set_handler(CHECKPOINT_SIGNAL)?;

  for signal in TERMINATING_SIGNALS {
    set_handler(signal)?;
  }

  // SAFETY: `on_exit` is a plain extern "C" function with no arguments.
  if unsafe { libc::atexit(on_exit) } != 0 {
    warn!("failed to register exit hook, no final report at exit");
  }

  debug!("introspection signals installed");
  Ok(dispatcher)
}

/// The installed dispatcher, if any.
#[must_use]
pub fn dispatcher() -> Option<&'static Dispatcher> {
  DISPATCHER.get()
}

/// Map a signal number to the trigger it requests.
#[must_use]
pub fn trigger_for(signal: c_int) -> Option<Trigger> {
  match signal {
    DUMP_SIGNAL => Some(Trigger::DumpLive),
    CHECKPOINT_SIGNAL => Some(Trigger::Checkpoint),
    _ if TERMINATING_SIGNALS.contains(&signal) => Some(Trigger::Terminate),
    _ => None,
  }
}

fn set_handler(signal: c_int) -> Result<(), TrackerError> {
  let handler: extern "C" fn(c_int) = on_signal;

  // SAFETY: the action is fully initialized before use and `on_signal` has the
  // signature `sa_sigaction` expects without `SA_SIGINFO`.
  let status = unsafe {
    let mut action: libc::sigaction = mem::zeroed();
    action.sa_sigaction = handler as libc::sighandler_t;
    action.sa_flags = libc::SA_RESTART;
    libc::sigemptyset(&mut action.sa_mask);
    libc::sigaction(signal, &action, ptr::null_mut())
  };

  if status != 0 {
    return Err(TrackerError::Signal {
      signal,
      source: io::Error::last_os_error(),
    });
  }

  Ok(())
}

extern "C" fn on_signal(signal: c_int) {
  let Some(dispatcher) = DISPATCHER.get() else {
    return;
  };

  match trigger_for(signal) {
    Some(Trigger::Terminate) => {
      dispatcher.terminate();

      // SAFETY: restoring the default disposition and re-raising lets the
      // process terminate the way it would have without us.
      unsafe {
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
      }
    }
    Some(trigger) => {
      dispatcher.deliver(trigger);
    }
    None => {}
  }
}

extern "C" fn on_exit() {
  if let Some(dispatcher) = DISPATCHER.get() {
    dispatcher.terminate();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn signals_map_to_triggers() {
    assert_eq!(trigger_for(libc::SIGUSR1), Some(Trigger::DumpLive));
    assert_eq!(trigger_for(libc::SIGUSR2), Some(Trigger::Checkpoint));
    assert_eq!(trigger_for(libc::SIGSEGV), Some(Trigger::Terminate));
    assert_eq!(trigger_for(libc::SIGHUP), None);
  }
}
