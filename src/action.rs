//! Run-once action with outcome replay.
//!
//! This module provides [`OnceAction<F, T>`], a thread-safe cell that owns a
//! computation `F` until it is first invoked and from then on owns the
//! computation's outcome. The computation runs exactly once no matter how many
//! threads invoke the action; all of them wait for that single run and observe
//! the same outcome.
//!
//! A computation that panics does not leave the cell empty for a retry. The
//! panic is captured as a [`ComputationAbort`] and becomes the permanent
//! outcome: every invocation, past and future, gets the same abort back.
//!
//! Like the other cells in this crate it uses an atomic fast path and futex
//! based parking for the slow path.

use core::cell::UnsafeCell;
use core::{fmt, mem};
use std::panic::{self, AssertUnwindSafe};

use crate::abort::ComputationAbort;
use crate::state::{ActionState, OnceGuard, OnceLock};

/// Either the computation or its outcome.
union Slot<F, T> {
   pending: mem::ManuallyDrop<F>,
   settled: mem::ManuallyDrop<Result<T, ComputationAbort>>,
}

impl<F, T> Slot<F, T> {
   #[inline(always)]
   const fn pending(f: F) -> Self {
      Self {
         pending: mem::ManuallyDrop::new(f),
      }
   }

   #[inline(always)]
   const fn settled(outcome: Result<T, ComputationAbort>) -> Self {
      Self {
         settled: mem::ManuallyDrop::new(outcome),
      }
   }

   #[inline(always)]
   unsafe fn take_pending(&mut self) -> F {
      // SAFETY: The caller guarantees the slot is pending.
      unsafe { mem::ManuallyDrop::take(&mut self.pending) }
   }

   #[inline(always)]
   unsafe fn drop_settled(&mut self) {
      // SAFETY: The caller guarantees the slot is settled and never read again.
      unsafe { mem::ManuallyDrop::drop(&mut self.settled) }
   }
}

/// Exclusive access to the slot while the computation runs.
///
/// Guarantees the slot always ends up settled: if it is dropped before
/// [`settle`](Self::settle) the action records an abort.
struct Settler<'a, F, T> {
   slot: &'a mut Slot<F, T>,
   guard: Option<OnceGuard<'a>>,
   taken: bool,
}

impl<'a, F, T> Settler<'a, F, T> {
   /// # Safety
   ///
   /// `guard` must be the lock of the action that owns `slot`.
   #[inline(always)]
   unsafe fn new(slot: &'a UnsafeCell<Slot<F, T>>, guard: OnceGuard<'a>) -> Self {
      Self {
         // SAFETY: Holding the guard gives exclusive access to the slot.
         slot: unsafe { &mut *slot.get() },
         guard: Some(guard),
         taken: false,
      }
   }

   #[inline(always)]
   fn take_computation(&mut self) -> F {
      debug_assert!(!self.taken, "computation already taken");
      self.taken = true;
      // SAFETY: The slot is pending until the first settle, and only the
      // guard holder can get here.
      unsafe { self.slot.take_pending() }
   }

   #[inline(always)]
   fn settle(mut self, outcome: Result<T, ComputationAbort>) {
      let failed = outcome.is_err();
      *self.slot = Slot::settled(outcome);
      if let Some(guard) = self.guard.take() {
         let settled = guard.commit(failed);
         debug_assert!(settled, "action settled twice");
      }
   }
}

impl<F, T> Drop for Settler<'_, F, T> {
   fn drop(&mut self) {
      let Some(guard) = self.guard.take() else {
         return;
      };
      if !self.taken {
         // SAFETY: Still pending, nobody else can see the computation.
         drop(unsafe { self.slot.take_pending() });
      }
      *self.slot = Slot::settled(Err(ComputationAbort::new(
         "computation abandoned before completion",
      )));
      let settled = guard.commit(true);
      debug_assert!(settled, "action settled twice");
   }
}

/// A thread-safe action which runs its computation at most once.
///
/// Invokers block until the one run finishes and then all observe its outcome.
/// If the computation panics, every invocation replays the same
/// [`ComputationAbort`]; the action is never reset.
///
/// An action must not invoke itself from inside its own computation: the nested
/// call waits for the outer one and never returns.
pub struct OnceAction<F, T> {
   slot: UnsafeCell<Slot<F, T>>,
   lock: OnceLock,
}

impl<F, T> OnceAction<F, T> {
   /// Creates a pending action bound to `f`.
   #[inline]
   #[must_use]
   pub const fn new(f: F) -> Self
   where
      F: FnOnce() -> T,
   {
      Self {
         lock: OnceLock::new(),
         slot: UnsafeCell::new(Slot::pending(f)),
      }
   }

   /// Creates an action that has already completed with `value`.
   #[inline]
   #[must_use]
   pub const fn with_value(value: T) -> Self {
      Self {
         lock: OnceLock::done(),
         slot: UnsafeCell::new(Slot::settled(Ok(value))),
      }
   }

   /// Current lifecycle state. Never blocks.
   #[inline]
   pub fn state(&self) -> ActionState {
      self.lock.state()
   }

   /// Checks if an outcome, value or abort, has been recorded. Never blocks.
   #[inline]
   pub fn is_done(&self) -> bool {
      self.lock.is_done()
   }

   /// Checks if the computation aborted. Never blocks.
   #[inline]
   pub fn is_failed(&self) -> bool {
      self.state() == ActionState::Failed
   }

   /// Returns the recorded outcome, or `None` while pending or running.
   ///
   /// Never blocks and never runs the computation.
   #[inline]
   pub fn peek(&self) -> Option<Result<&T, &ComputationAbort>> {
      if self.is_done() {
         // SAFETY: DONE is only set after the slot is settled.
         Some(unsafe { self.outcome_unchecked() }.as_ref())
      } else {
         None
      }
   }

   /// Returns the value if the computation completed successfully.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      self.peek()?.ok()
   }

   /// # Safety
   ///
   /// The action must be done.
   #[inline]
   unsafe fn outcome_unchecked(&self) -> &Result<T, ComputationAbort> {
      debug_assert!(self.is_done(), "outcome read before the action settled");
      // SAFETY: The caller guarantees the slot is settled; settled slots are never written again.
      unsafe { &(*self.slot.get()).settled }
   }

   #[inline]
   fn finish(&self) -> Result<&T, ComputationAbort> {
      // SAFETY: Only called after lock()/lock_async() returned, which means settled.
      unsafe { self.outcome_unchecked() }
         .as_ref()
         .map_err(Clone::clone)
   }
}

impl<F, T> OnceAction<F, T>
where
   F: FnOnce() -> T,
{
   /// Runs the computation if nobody has yet and returns its value.
   ///
   /// Blocks while another thread runs the computation. If the computation
   /// panicked, on this thread or any other, the recorded abort is raised here.
   #[inline]
   pub fn invoke(&self) -> &T {
      match self.try_invoke() {
         Ok(value) => value,
         Err(abort) => abort.raise(),
      }
   }

   /// Like [`invoke`](Self::invoke), but returns the abort instead of unwinding.
   #[inline]
   pub fn try_invoke(&self) -> Result<&T, ComputationAbort> {
      if !self.is_done() {
         self.run(self.lock.lock());
      }
      self.finish()
   }

   /// Async flavour of [`invoke`](Self::invoke).
   ///
   /// Waiting for another invoker does not block the executor. The computation
   /// itself is synchronous and runs inline on the task that wins.
   pub async fn invoke_async(&self) -> &T {
      match self.try_invoke_async().await {
         Ok(value) => value,
         Err(abort) => abort.raise(),
      }
   }

   /// Async flavour of [`try_invoke`](Self::try_invoke).
   pub async fn try_invoke_async(&self) -> Result<&T, ComputationAbort> {
      if !self.is_done() {
         self.run(self.lock.lock_async().await);
      }
      self.finish()
   }

   #[cold]
   fn run(&self, guard: Option<OnceGuard<'_>>) {
      let Some(guard) = guard else {
         return; // Someone else ran it while we waited
      };
      // SAFETY: We hold the lock of this action.
      let mut settler = unsafe { Settler::new(&self.slot, guard) };
      let f = settler.take_computation();
      let outcome = panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
         let abort = ComputationAbort::from_payload(payload);
         log::debug!("once action aborted: {}", abort.message());
         abort
      });
      settler.settle(outcome);
   }
}

// --- Trait Implementations ---

// SAFETY:
// The computation is moved to and consumed by whichever thread wins the lock,
// so `F: Send`. The outcome is written by one thread and then shared by
// reference with all others, so `T: Send + Sync`.
unsafe impl<F: Send, T: Send + Sync> Sync for OnceAction<F, T> {}
// SAFETY:
// Moving the action moves ownership of either the computation or the outcome.
unsafe impl<F: Send, T: Send> Send for OnceAction<F, T> {}

impl<F, T: fmt::Debug> fmt::Debug for OnceAction<F, T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_tuple("OnceAction");
      match self.peek() {
         Some(Ok(value)) => d.field(value),
         Some(Err(abort)) => d.field(abort),
         None => d.field(&format_args!("<pending>")),
      };
      d.finish()
   }
}

impl<F, T> Drop for OnceAction<F, T> {
   fn drop(&mut self) {
      // SAFETY: `&mut self` rules out a concurrent invocation, so the slot is
      // either still pending or settled, as reported by the lock.
      unsafe {
         match self.lock.state() {
            ActionState::Pending => drop(self.slot.get_mut().take_pending()),
            ActionState::Done | ActionState::Failed => self.slot.get_mut().drop_settled(),
            ActionState::Running => {}
         }
      }
   }
}
