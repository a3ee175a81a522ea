/*!
 * Thread-Affinity Lock State Machine
 *
 * Some lock implementations must be released by the OS thread that acquired
 * them. A wrapper offers both a foreground path (calling thread) and a
 * background path (its single offload worker), so it records which one holds
 * the primitive and refuses to release across paths unless told to.
 *
 * # States
 *
 * ```text
 *            acquire()                      async_acquire()
 *   Idle ---------------> HeldForeground    Idle ---------------> HeldBackground
 *        <---------------                        <---------------
 *            release()                      async_release() / release(force)
 * ```
 *
 * The background transitions are stored by the worker job itself, so a
 * cancelled `async_acquire` that already succeeded still ends in
 * `HeldBackground`.
 */

use crate::capability::Capability;
use crate::core::errors::{BridgeError, BridgeResult};
use crate::executor::{Executor, OffloadHandle};
use crate::sync::traits::Acquire;
use futures::future::Either;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Which path currently holds the primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HoldState {
    Idle = 0,
    HeldForeground = 1,
    HeldBackground = 2,
}

impl HoldState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => HoldState::HeldForeground,
            2 => HoldState::HeldBackground,
            _ => HoldState::Idle,
        }
    }
}

/// Hold state shared with in-flight worker jobs
#[derive(Debug, Clone, Default)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    #[inline]
    pub(crate) fn load(&self) -> HoldState {
        HoldState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, state: HoldState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Warns if an `async_acquire` future is dropped before its result arrives
struct CancelWatch {
    armed: bool,
}

impl CancelWatch {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelWatch {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "async_acquire dropped before completion; the primitive may still be \
                 acquired in the background and must be released with force_background_thread"
            );
        }
    }
}

/// Acquire/release bookkeeping around an [`Acquire`] delegate
pub struct LockStateMachine<D> {
    delegate: Arc<D>,
    executor: Executor,
    state: StateCell,
}

impl<D: Acquire> LockStateMachine<D> {
    pub fn new(delegate: Arc<D>, capability: &'static Capability) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(capability),
            state: StateCell::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> HoldState {
        self.state.load()
    }

    #[inline]
    pub fn delegate(&self) -> &Arc<D> {
        &self.delegate
    }

    #[inline]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Acquire on the calling thread
    pub fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        let acquired = self.delegate.acquire(blocking, timeout)?;
        if acquired {
            self.state.store(HoldState::HeldForeground);
        }
        Ok(acquired)
    }

    /// Acquire on the background worker
    ///
    /// Concurrent calls on one wrapper are unsupported: await each before
    /// issuing the next.
    pub fn async_acquire(
        &self,
        blocking: bool,
        timeout: Option<Duration>,
    ) -> impl Future<Output = BridgeResult<bool>> + Send + 'static {
        let delegate = Arc::clone(&self.delegate);
        let state = self.state.clone();

        let handle = self.executor.submit(move || -> BridgeResult<bool> {
            let acquired = delegate.acquire(blocking, timeout)?;
            if acquired {
                state.store(HoldState::HeldBackground);
            }
            Ok(acquired)
        });

        let mut watch = CancelWatch { armed: true };
        async move {
            let result = handle.await;
            watch.disarm();
            result?
        }
    }

    /// Release from the calling thread
    ///
    /// A background hold needs `force_background_thread`; the release then
    /// runs on the worker that acquired, and this call blocks until it is done.
    pub fn release(&self, force_background_thread: bool) -> BridgeResult<()> {
        match self.state.load() {
            HoldState::HeldBackground if !force_background_thread => {
                Err(BridgeError::OwnershipViolation(
                    "a lock acquired via async_acquire must be released via async_release, \
                     or via release(force_background_thread = true)"
                        .into(),
                ))
            }
            HoldState::HeldBackground => {
                let delegate = Arc::clone(&self.delegate);
                self.executor.run_blocking(move || delegate.release())??;
                self.state.store(HoldState::Idle);
                Ok(())
            }
            HoldState::Idle | HoldState::HeldForeground => {
                self.delegate.release()?;
                self.state.store(HoldState::Idle);
                Ok(())
            }
        }
    }

    /// Release on the background worker
    ///
    /// A foreground hold needs `force_background_thread`; the release then
    /// runs synchronously and the returned future is already resolved.
    pub fn async_release(
        &self,
        force_background_thread: bool,
    ) -> impl Future<Output = BridgeResult<()>> + Send + 'static {
        match self.state.load() {
            HoldState::HeldBackground => {
                let delegate = Arc::clone(&self.delegate);
                let state = self.state.clone();
                let handle = self.executor.submit(move || -> BridgeResult<()> {
                    delegate.release()?;
                    state.store(HoldState::Idle);
                    Ok(())
                });
                Either::Left(async move { handle.await? })
            }
            _ if !force_background_thread => Either::Right(OffloadHandle::ready(Err(
                BridgeError::OwnershipViolation(
                    "a lock acquired via acquire must be released via release".into(),
                ),
            ))),
            _ => {
                let result = self.delegate.release();
                if result.is_ok() {
                    self.state.store(HoldState::Idle);
                }
                Either::Right(OffloadHandle::ready(result))
            }
        }
    }

    /// Reset after the wrapper moved to another process or thread
    pub(crate) fn reset_after_transfer(&self) {
        self.executor.resume_after_transfer();
        self.state.store(HoldState::Idle);
    }

    /// A copy sharing the delegate, with its own engine and an `Idle` state
    pub(crate) fn transfer_copy(&self) -> Self {
        Self {
            delegate: Arc::clone(&self.delegate),
            executor: self.executor.clone(),
            state: StateCell::default(),
        }
    }
}
