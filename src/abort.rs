//! The abort recorded when a computation panics.

use std::any::Any;
use std::fmt;
use std::panic;
use std::sync::{Arc, Mutex, PoisonError};

/// The value a computation panicked with, shared by every clone of its abort.
type Payload = Arc<Mutex<Box<dyn Any + Send>>>;

/// A computation terminated by panicking instead of returning a value.
///
/// The abort is captured once, on the thread that ran the computation, and then
/// handed out to every caller of the same action for as long as the action
/// lives. Cloning is cheap.
///
/// The original panic payload is kept, whatever its type, and can be recovered
/// from any clone with [`payload`](Self::payload) or
/// [`with_payload`](Self::with_payload).
///
/// ```rust
/// use std::panic;
///
/// use keyed_once::OnceMap;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Code(u32);
///
/// let map: OnceMap<&str, u32> = OnceMap::new();
/// let abort = map
///    .try_get_or_init("config", || panic::panic_any(Code(42)))
///    .unwrap_err();
/// assert_eq!(abort.payload::<Code>(), Some(Code(42)));
/// ```
#[derive(Clone, thiserror::Error)]
#[error("computation aborted: {message}")]
pub struct ComputationAbort {
   message: Arc<str>,
   payload: Option<Payload>,
}

impl ComputationAbort {
   /// Creates an abort with the given message and no payload.
   pub fn new(message: impl Into<Arc<str>>) -> Self {
      Self {
         message: message.into(),
         payload: None,
      }
   }

   /// Converts a panic payload, as returned by [`std::panic::catch_unwind`].
   ///
   /// String payloads also become the message; anything else is described as
   /// `Box<dyn Any>`. Either way the payload itself is kept. A payload that
   /// already is a `ComputationAbort` (the replay of another action's failure)
   /// is returned unchanged so the root cause survives nesting.
   pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
      match payload.downcast::<ComputationAbort>() {
         Ok(abort) => *abort,
         Err(payload) => {
            let message: Arc<str> = if let Some(message) = payload.downcast_ref::<&'static str>() {
               Arc::from(*message)
            } else if let Some(message) = payload.downcast_ref::<String>() {
               Arc::from(message.as_str())
            } else {
               Arc::from("Box<dyn Any>")
            };
            Self {
               message,
               payload: Some(Arc::new(Mutex::new(payload))),
            }
         }
      }
   }

   /// The panic message of the original failure.
   pub fn message(&self) -> &str {
      &self.message
   }

   /// Checks if the original panic payload is a `P`.
   pub fn is<P: Any>(&self) -> bool {
      self.with_payload(|payload| payload.is::<P>()).unwrap_or(false)
   }

   /// A clone of the original panic payload, if it is a `P`.
   pub fn payload<P: Any + Clone>(&self) -> Option<P> {
      self.with_payload(|payload| payload.downcast_ref::<P>().cloned()).flatten()
   }

   /// Calls `f` with the original panic payload.
   ///
   /// Returns `None` for an abort that was not built from a panic.
   pub fn with_payload<R>(&self, f: impl FnOnce(&(dyn Any + Send)) -> R) -> Option<R> {
      let payload = self.payload.as_ref()?;
      let payload = payload.lock().unwrap_or_else(PoisonError::into_inner);
      Some(f(&**payload))
   }

   /// Unwinds the current thread with this abort as the panic payload.
   ///
   /// The panic hook is not invoked, only the original failure reports through it.
   pub fn raise(&self) -> ! {
      panic::resume_unwind(Box::new(self.clone()))
   }
}

impl PartialEq for ComputationAbort {
   /// Two aborts are equal when they carry the same message and stem from the
   /// same captured panic.
   fn eq(&self, other: &Self) -> bool {
      let same_payload = match (&self.payload, &other.payload) {
         (Some(a), Some(b)) => Arc::ptr_eq(a, b),
         (None, None) => true,
         _ => false,
      };
      same_payload && self.message == other.message
   }
}

impl Eq for ComputationAbort {}

impl fmt::Debug for ComputationAbort {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ComputationAbort")
         .field("message", &self.message)
         .finish_non_exhaustive()
   }
}
