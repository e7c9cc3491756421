//! Execution guard shared by every once action.
//!
//! The whole lifecycle of an action is packed into a single `AtomicU8`:
//! - Bit 0: DONE - An outcome has been recorded
//! - Bit 1: LOCKED - A thread is running the computation
//! - Bit 2: WAITING - At least one thread is parked on the outcome
//! - Bit 3: FAILED - The recorded outcome is an abort
//! - Bits 4-7: EPOCH - Bumped on settle so parked threads never sleep on a stale value
//!
//! Unlike a plain once cell, an action never goes back to the pending state: once
//! DONE is set it stays set, whether the computation returned or aborted.

use core::sync::atomic::{self, AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Observable lifecycle of a once action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionState {
   /// The computation has not started yet.
   Pending,
   /// Some thread is running the computation; invokers will block.
   Running,
   /// The computation returned a value.
   Done,
   /// The computation aborted; the abort is replayed to every invoker.
   Failed,
}

/// Atomic state of a single action.
#[repr(transparent)]
pub(crate) struct OnceLock(AtomicU8);

impl OnceLock {
   /// Bit flag: Outcome recorded.
   const DONE: u8 = 1;
   /// Bit flag: Computation is running.
   const LOCKED: u8 = 2;
   /// Bit flag: At least one thread is waiting for the outcome.
   const WAITING: u8 = 4;
   /// Bit flag: Outcome is an abort. Only meaningful together with DONE.
   const FAILED: u8 = 8;
   /// Start of epoch bits.
   const EPOCH_1: u8 = 16;
   /// Mask for epoch bits.
   const EPOCH_MASK: u8 = !(Self::DONE | Self::LOCKED | Self::WAITING | Self::FAILED);

   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// Creates a pending state.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   /// Creates a state that already holds a value.
   #[inline]
   pub(crate) const fn done() -> Self {
      Self(AtomicU8::new(Self::DONE))
   }

   /// Wakes every thread parked on this state.
   #[inline]
   fn notify_all(&self) {
      // SAFETY: The address passed to unpark must match the address used for park.
      // Both use the address of the inner atomic.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread until the state moves away from `expected_state`.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         // park() re-validates before sleeping, so a settle racing with us is not lost.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(atomic::Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
         // Spurious wakeups are fine, callers loop and re-check.
      }
   }

   /// Records the terminal outcome, bumps the epoch and wakes waiters.
   /// Returns `true` if the state was not already terminal.
   #[inline]
   pub(crate) fn settle(&self, failed: bool) -> bool {
      let current_state = self.0.load(Ordering::Relaxed);
      let mut new_state = Self::DONE | Self::next_epoch(current_state);
      if failed {
         new_state |= Self::FAILED;
      }

      // Release: the outcome written by the lock holder happens-before any
      // Acquire load that observes DONE.
      let prev_state = self.0.swap(new_state, Ordering::Release);

      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }

      prev_state & Self::DONE == 0
   }

   /// Checks if an outcome has been recorded.
   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.0.load(Ordering::Acquire) & Self::DONE != 0
   }

   /// Snapshot of the lifecycle state.
   #[inline]
   pub(crate) fn state(&self) -> ActionState {
      let state = self.0.load(Ordering::Acquire);
      if state & Self::DONE != 0 {
         if state & Self::FAILED != 0 {
            ActionState::Failed
         } else {
            ActionState::Done
         }
      } else if state & Self::LOCKED != 0 {
         ActionState::Running
      } else {
         ActionState::Pending
      }
   }

   /// One attempt at acquiring the right to run the computation.
   ///
   /// Returns:
   ///   - `Ok(None)`: Outcome already recorded.
   ///   - `Ok(Some(guard))`: Caller must run the computation and commit.
   ///   - `Err(current_state)`: Someone else is running it; `current_state` has WAITING set.
   #[inline]
   fn lock_step(&self) -> Result<Option<OnceGuard<'_>>, u8> {
      loop {
         let current_state = self.0.load(Ordering::Acquire);
         if current_state & Self::DONE != 0 {
            return Ok(None);
         }

         if current_state & Self::LOCKED == 0 {
            match self.0.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(OnceGuard::new(self))),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         if current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.0.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(new_state),
               Err(_) => {
                  // Might have become DONE in the meantime.
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(current_state);
      }
   }

   /// Acquires the right to run the computation, blocking while another thread runs it.
   ///
   /// Returns `None` once an outcome is recorded.
   #[inline]
   pub(crate) fn lock(&self) -> Option<OnceGuard<'_>> {
      match self.lock_step() {
         Ok(guard_opt) => guard_opt,
         Err(mut state_when_failed) => loop {
            self.wait(state_when_failed);
            match self.lock_step() {
               Ok(guard_opt) => return guard_opt,
               Err(new_state) => state_when_failed = new_state,
            }
         },
      }
   }

   /// Async flavour of [`lock`](Self::lock).
   ///
   /// Yields to the executor for a while, then parks inside `block_in_place`
   /// when running on a multi-threaded runtime. On any other runtime it keeps
   /// yielding.
   #[inline]
   pub(crate) async fn lock_async(&self) -> Option<OnceGuard<'_>> {
      loop {
         for _ in 0..16 {
            match self.lock_step() {
               Ok(guard_opt) => return guard_opt,
               Err(state) => {
                  for _ in 0..32 {
                     #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
                     tokio::task::yield_now().await;
                     #[cfg(not(any(feature = "async-tokio", feature = "async-tokio-mt")))]
                     std::hint::spin_loop();
                     if self.0.load(Ordering::Relaxed) != state {
                        break;
                     }
                  }
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         {
            if on_multi_thread_runtime() {
               return match self.lock_step() {
                  Ok(guard_opt) => guard_opt,
                  Err(state) => tokio::task::block_in_place(|| {
                     self.wait(state);
                     self.lock()
                  }),
               };
            }
         }
      }
   }
}

#[cfg(feature = "async-tokio-mt")]
#[inline]
fn on_multi_thread_runtime() -> bool {
   use tokio::runtime::{Handle, RuntimeFlavor};

   Handle::try_current().is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
}

/// Right to run an action's computation.
///
/// Dropping it without [`commit`](Self::commit) settles the action as failed; the
/// owner is expected to have recorded an abort outcome before that happens.
#[must_use]
pub(crate) struct OnceGuard<'a> {
   state: &'a OnceLock,
}

impl<'a> OnceGuard<'a> {
   #[inline(always)]
   const fn new(state: &'a OnceLock) -> Self {
      Self { state }
   }

   /// Records the outcome kind and wakes every waiter.
   #[inline(always)]
   pub(crate) fn commit(self, failed: bool) -> bool {
      let settled = self.state.settle(failed);
      core::mem::forget(self);
      settled
   }
}

impl Drop for OnceGuard<'_> {
   #[inline(always)]
   fn drop(&mut self) {
      self.state.settle(true);
   }
}
