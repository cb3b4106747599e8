use super::*;

/// Spin briefly, then yield, until `mutex` is free or `timeout` elapses.
///
/// Used on paths that may run in signal context on a thread already holding
/// `mutex`, where blocking would never return. A poisoned lock is recovered.
pub(crate) fn try_lock_for<T: ?Sized>(
  mutex: &Mutex<T>,
  timeout: Duration,
) -> Option<MutexGuard<'_, T>> {
  let deadline = Instant::now() + timeout;
  let mut spins = 0u32;

  loop {
    match mutex.try_lock() {
      Ok(guard) => return Some(guard),
      Err(TryLockError::Poisoned(err)) => return Some(err.into_inner()),
      Err(TryLockError::WouldBlock) => {
        if Instant::now() >= deadline {
          return None;
        }

        if spins < 64 {
          spins += 1;
          hint::spin_loop();
        } else {
          thread::yield_now();
        }
      }
    }
  }
}

/// Write `message` straight to file descriptor 2.
///
/// Bypasses `std::io::stderr`, whose lock may be held by the code a signal
/// interrupted.
pub(crate) fn write_stderr_raw(message: &str) {
  #[cfg(unix)]
  {
    let mut bytes = message.as_bytes();

    while !bytes.is_empty() {
      // SAFETY: `bytes` is a live slice; write(2) is async-signal-safe.
      let written = unsafe {
        libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len())
      };

      match usize::try_from(written) {
        Ok(0) | Err(_) => return,
        Ok(count) => bytes = &bytes[count.min(bytes.len())..],
      }
    }
  }

  #[cfg(not(unix))]
  {
    let _ = io::stderr().write_all(message.as_bytes());
  }
}
