//! Single-shot completion handlers.

use futures::channel::oneshot;
use std::fmt;

/// A single-shot completion handler.
///
/// A [Callback] owns whatever state it captured and is consumed when invoked, so it can run at
/// most once. Dropping a callback without invoking it (for example, when a pending request is
/// discarded at teardown) never runs it.
pub struct Callback(Box<dyn FnOnce() + Send>);

impl Callback {
    /// Create a callback from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Create a callback that does nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Create a callback that resolves the returned receiver when invoked.
    ///
    /// If the callback is dropped without being invoked, the receiver resolves to
    /// [oneshot::Canceled].
    pub fn oneshot() -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        let callback = Self::new(move || {
            // The caller may no longer be listening
            let _ = sender.send(());
        });
        (callback, receiver)
    }

    /// Run the callback, consuming it.
    pub fn invoke(self) {
        (self.0)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}
