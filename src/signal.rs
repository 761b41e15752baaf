//! Single-fire termination signal.
//!
//! A single-assignment listener slot guarded by one mutex. The same mutex
//! covers arming (with its "already terminated?" check) and taking the
//! listener out for firing, so the race between a caller registering a
//! listener and a worker thread detecting full termination cannot
//! double-fire or drop the notification. The listener itself is invoked
//! after the guard is dropped, so it may call back into the pool.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Callback invoked exactly once when the pool is fully terminated.
pub(crate) type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of arming the signal.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Arm {
    /// The listener was stored and will fire when termination is detected.
    Deferred,
    /// The pool was already terminated; the listener fired inline.
    FiredInline,
}

/// A listener is already armed.
#[derive(Debug)]
pub(crate) struct AlreadyArmed;

pub(crate) struct TerminationSignal {
    listener: Mutex<Option<Listener>>,
}

impl TerminationSignal {
    pub(crate) fn new() -> Self {
        TerminationSignal {
            listener: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the signal, or fires the listener inline if `already_terminated`
    /// reports that termination has already completed.
    ///
    /// The terminated check runs under the signal mutex, making "check state
    /// and register" one atomic step with respect to [`complete_if`].
    ///
    /// [`complete_if`]: TerminationSignal::complete_if
    pub(crate) fn arm(
        &self,
        listener: Listener,
        already_terminated: impl FnOnce() -> bool,
    ) -> Result<Arm, AlreadyArmed> {
        {
            let mut slot = self.slot();
            if slot.is_some() {
                return Err(AlreadyArmed);
            }
            if !already_terminated() {
                *slot = Some(listener);
                return Ok(Arm::Deferred);
            }
        }
        // The listener was never stored, so no other thread can reach it.
        // Invoked outside the lock so it may call back into this signal.
        listener();
        Ok(Arm::FiredInline)
    }

    /// Runs `transition` under the signal mutex and, if it reports that this
    /// caller performed the termination transition, fires and clears the
    /// armed listener.
    ///
    /// `transition` must succeed for at most one caller (the pool uses a
    /// compare-and-swap on its state), so a listener can never fire twice
    /// even when several threads detect termination concurrently.
    ///
    /// Returns whether the transition succeeded.
    pub(crate) fn complete_if(&self, transition: impl FnOnce() -> bool) -> bool {
        let listener = {
            let mut slot = self.slot();
            if !transition() {
                return false;
            }
            slot.take()
        };
        // The transition succeeds for exactly one caller, so the taken
        // listener cannot fire twice. Invoked outside the lock so it may
        // call back into this signal.
        if let Some(listener) = listener {
            listener();
        }
        true
    }

    #[cfg(test)]
    fn is_armed(&self) -> bool {
        self.slot().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_listener(fired: &Arc<AtomicUsize>) -> Listener {
        let fired = fired.clone();
        Box::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_arm_defers_when_not_terminated() {
        let signal = TerminationSignal::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let arm = signal.arm(counting_listener(&fired), || false).unwrap();
        assert_eq!(arm, Arm::Deferred);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(signal.is_armed());
    }

    #[test]
    fn test_arm_fires_inline_when_terminated() {
        let signal = TerminationSignal::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let arm = signal.arm(counting_listener(&fired), || true).unwrap();
        assert_eq!(arm, Arm::FiredInline);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!signal.is_armed());
    }

    #[test]
    fn test_double_arm_rejected() {
        let signal = TerminationSignal::new();
        let fired = Arc::new(AtomicUsize::new(0));

        signal.arm(counting_listener(&fired), || false).unwrap();
        assert!(signal.arm(counting_listener(&fired), || false).is_err());

        // The first listener is unaffected.
        assert!(signal.complete_if(|| true));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_complete_fires_at_most_once() {
        let signal = TerminationSignal::new();
        let fired = Arc::new(AtomicUsize::new(0));
        signal.arm(counting_listener(&fired), || false).unwrap();

        assert!(signal.complete_if(|| true));
        // A second, spurious termination detection finds the slot cleared.
        assert!(signal.complete_if(|| true));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_transition_keeps_listener() {
        let signal = TerminationSignal::new();
        let fired = Arc::new(AtomicUsize::new(0));
        signal.arm(counting_listener(&fired), || false).unwrap();

        assert!(!signal.complete_if(|| false));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(signal.is_armed());
    }

    #[test]
    fn test_complete_without_listener_is_noop() {
        let signal = TerminationSignal::new();
        assert!(signal.complete_if(|| true));
    }

    #[test]
    fn test_listener_may_call_back_into_the_signal() {
        // A listener that uses the signal again must not deadlock on the
        // slot mutex.
        let signal = Arc::new(TerminationSignal::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let inner_signal = signal.clone();
        let inner_fired = fired.clone();
        signal
            .arm(
                Box::new(move || {
                    inner_fired.fetch_add(1, Ordering::SeqCst);
                    inner_signal
                        .arm(counting_listener(&inner_fired), || false)
                        .unwrap();
                }),
                || false,
            )
            .unwrap();

        assert!(signal.complete_if(|| true));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // The listener re-armed the signal from inside the callback.
        assert!(signal.is_armed());
    }
}
