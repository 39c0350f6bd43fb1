//! Shared renderer access.
//!
//! A renderer paints into scratch state it owns, so at most one render may
//! run on it at a time. [`RendererHandle`] is the cheap, cloneable way to
//! hand one renderer to several compositions: each takes a lease, and other
//! callers wait until it is dropped.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{PaginateError, Result};

/// Cloneable handle to a renderer shared between threads.
pub struct RendererHandle<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for RendererHandle<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> RendererHandle<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(renderer)),
        }
    }

    /// Block until the renderer is free and take exclusive use of it.
    ///
    /// Fails if a previous holder panicked while rendering; the renderer's
    /// scratch state can no longer be trusted.
    pub fn acquire(&self) -> Result<RendererLease<'_, R>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| PaginateError::RendererUnavailable("a previous render panicked".to_string()))?;
        log::trace!("Renderer lease acquired");
        Ok(RendererLease { guard })
    }

    /// Run `f` with exclusive use of the renderer.
    pub fn with<T>(&self, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
        let mut lease = self.acquire()?;
        f(&mut *lease)
    }
}

/// Exclusive use of a shared renderer; released when dropped, on every exit
/// path including errors and unwinding.
pub struct RendererLease<'a, R> {
    guard: MutexGuard<'a, R>,
}

impl<R> Deref for RendererLease<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.guard
    }
}

impl<R> DerefMut for RendererLease<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.guard
    }
}

impl<R> Drop for RendererLease<'_, R> {
    fn drop(&mut self) {
        log::trace!("Renderer lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn leases_are_exclusive_and_released() {
        let handle = RendererHandle::new(0u32);
        {
            let mut lease = handle.acquire().unwrap();
            *lease += 1;
            assert!(handle.inner.try_lock().is_err(), "lease should hold the lock");
        }
        assert!(handle.inner.try_lock().is_ok(), "dropping the lease frees it");
        assert_eq!(*handle.acquire().unwrap(), 1);
    }

    #[test]
    fn lease_is_released_on_error() {
        let handle = RendererHandle::new(Vec::<u32>::new());
        let result: Result<()> = handle.with(|v| {
            v.push(1);
            Err(PaginateError::Encode("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(handle.with(|v| Ok(v.len())).unwrap(), 1);
    }

    #[test]
    fn poisoned_renderer_is_unavailable() {
        let handle = RendererHandle::new(0u32);
        let h2 = handle.clone();
        let _ = thread::spawn(move || {
            let _lease = h2.acquire().unwrap();
            panic!("render blew up");
        })
        .join();
        assert!(matches!(
            handle.acquire(),
            Err(PaginateError::RendererUnavailable(_))
        ));
    }

    #[test]
    fn concurrent_users_serialize() {
        let handle = RendererHandle::new(0u64);
        thread::scope(|s| {
            for _ in 0..8 {
                let h = handle.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        h.with(|n| {
                            *n += 1;
                            Ok(())
                        })
                        .unwrap();
                    }
                });
            }
        });
        assert_eq!(*handle.acquire().unwrap(), 800);
    }
}
