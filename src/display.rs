// display.rs - Contracts with the single-threaded display layer.
//
// Everything that touches windows, menus or labels goes through these traits.
// The desktop shell implements them on top of Tauri; tests use `UiThread` and
// small recording fakes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};

use crate::catalog::{IntegrationKind, ModeKey};

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("Display element not found: {0}")]
    MissingElement(String),
    #[error("Display operation failed: {0}")]
    Failed(String),
}

/// Operations the selection manager needs from the display.
pub trait DisplayBridge: Send + Sync {
    /// Whether the custom AI backend is the one currently in effect for `kind`.
    fn custom_backend_active(&self, kind: IntegrationKind) -> bool;

    /// Make the custom AI backend the active one for `kind` and refresh visuals.
    fn apply_custom_backend(&self, kind: IntegrationKind) -> Result<(), DisplayError>;

    fn set_label(&self, kind: IntegrationKind, label: &str) -> Result<(), DisplayError>;

    fn set_checked(
        &self,
        kind: IntegrationKind,
        key: ModeKey,
        checked: bool,
    ) -> Result<(), DisplayError>;

    /// Show a diagnostic the user has to acknowledge.
    fn show_error(&self, title: &str, detail: &str);
}

pub type UiJob = Box<dyn FnOnce() + Send + 'static>;

/// The display's single execution context. Jobs run one at a time, in order.
pub trait DisplayContext: Send + Sync {
    fn post(&self, job: UiJob);
}

/// Revocable flag tied to the lifetime of one output surface.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the surface as torn down. Irreversible.
    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Where streamed translation output is written. Called only on the display context.
pub trait OutputSurface: Send + Sync {
    fn clear(&self);
    fn reveal(&self);
    fn set_input_enabled(&self, enabled: bool);
    fn append(&self, text: &str);
}

/// An output surface plus the token that says whether it still exists.
#[derive(Clone)]
pub struct OutputHandle {
    token: LivenessToken,
    surface: Arc<dyn OutputSurface>,
}

impl OutputHandle {
    pub fn new(token: LivenessToken, surface: Arc<dyn OutputSurface>) -> Self {
        Self { token, surface }
    }

    pub fn token(&self) -> &LivenessToken {
        &self.token
    }

    /// Run `f` against the surface unless it has been torn down.
    /// Returns whether `f` ran.
    pub fn with_surface(&self, f: impl FnOnce(&dyn OutputSurface)) -> bool {
        if !self.token.is_alive() {
            return false;
        }
        f(self.surface.as_ref());
        true
    }
}

/// A dedicated thread acting as the display context for headless runs and tests.
pub struct UiThread {
    tx: mpsc::UnboundedSender<UiJob>,
}

impl UiThread {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<UiJob>();
        thread::Builder::new().name(name.to_string()).spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                job();
            }
            log::debug!("UI thread exiting");
        })?;
        Ok(Self { tx })
    }

    /// Wait until every job posted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }
}

impl DisplayContext for UiThread {
    fn post(&self, job: UiJob) {
        if self.tx.send(job).is_err() {
            log::warn!("UI thread gone, dropping job");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl OutputSurface for Recorder {
        fn clear(&self) {
            self.0.lock().push("clear".into());
        }
        fn reveal(&self) {
            self.0.lock().push("reveal".into());
        }
        fn set_input_enabled(&self, enabled: bool) {
            self.0.lock().push(format!("input:{enabled}"));
        }
        fn append(&self, text: &str) {
            self.0.lock().push(format!("append:{text}"));
        }
    }

    #[test]
    fn revoked_handle_skips_surface() {
        let recorder = Arc::new(Recorder::default());
        let handle = OutputHandle::new(LivenessToken::new(), recorder.clone());
        assert!(handle.with_surface(|s| s.append("a")));
        handle.token().revoke();
        assert!(!handle.with_surface(|s| s.append("b")));
        assert_eq!(*recorder.0.lock(), vec!["append:a".to_string()]);
    }

    #[tokio::test]
    async fn ui_thread_runs_jobs_in_order() {
        let ui = UiThread::spawn("test-ui").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            ui.post(Box::new(move || seen.lock().push(i)));
        }
        ui.flush().await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
    }
}
