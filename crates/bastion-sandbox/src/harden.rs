use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bastion_config::SandboxConfig;

use crate::scope::{GlobalScope, JsValue, PropertyDescriptor};

/// Host-bridge globals a webview runtime may expose to page scripts.
pub const PRIVILEGED_GLOBALS: &[&str] = &[
    "__TAURI__",
    "__TAURI_INTERNALS__",
    "__TAURI_IPC__",
    "__TAURI_METADATA__",
    "__TAURI_INVOKE__",
    "__TAURI_POST_MESSAGE__",
    "__TAURI_EVENT_PLUGIN_INTERNALS__",
    "__TAURI_OS_PLUGIN_INTERNALS__",
];

/// Built-in privileged names followed by `extra`, without duplicates.
pub fn privileged_globals(extra: &[String]) -> Vec<String> {
    let mut names: Vec<String> = PRIVILEGED_GLOBALS.iter().map(|s| s.to_string()).collect();
    for name in extra {
        if !name.is_empty() && !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Diagnostics for one context. Never consulted for authorization.
#[derive(Debug, Default)]
pub struct SandboxStatus {
    tauri_globals_present: AtomicBool,
    passes: AtomicUsize,
    scrubbed: AtomicUsize,
}

impl SandboxStatus {
    /// Whether any privileged global was ever observed in this context.
    pub fn tauri_globals_present(&self) -> bool {
        self.tauri_globals_present.load(Ordering::SeqCst)
    }

    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }

    /// Number of successful redefinitions across all passes.
    pub fn scrubbed(&self) -> usize {
        self.scrubbed.load(Ordering::SeqCst)
    }
}

/// When the deferred passes run, measured from the immediate pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardeningSchedule {
    pub short: Duration,
    pub long: Duration,
}

impl Default for HardeningSchedule {
    fn default() -> Self {
        Self {
            short: Duration::from_millis(50),
            long: Duration::from_millis(500),
        }
    }
}

impl From<&SandboxConfig> for HardeningSchedule {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            short: Duration::from_millis(config.short_delay_ms),
            long: Duration::from_millis(config.long_delay_ms),
        }
    }
}

/// Scrubs privileged globals from one [`GlobalScope`].
pub struct Hardener {
    scope: Arc<dyn GlobalScope>,
    names: Vec<String>,
    status: Arc<SandboxStatus>,
}

impl Hardener {
    pub fn new(scope: Arc<dyn GlobalScope>) -> Self {
        Self {
            scope,
            names: privileged_globals(&[]),
            status: Arc::new(SandboxStatus::default()),
        }
    }

    pub fn from_config(scope: Arc<dyn GlobalScope>, config: &SandboxConfig) -> Self {
        Self::new(scope).with_extra_globals(&config.extra_globals)
    }

    pub fn with_extra_globals(mut self, extra: &[String]) -> Self {
        self.names = privileged_globals(extra);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn status(&self) -> Arc<SandboxStatus> {
        self.status.clone()
    }

    /// One scrub over every privileged name. Returns how many globals were
    /// redefined by this pass.
    ///
    /// Each present global becomes `undefined`, non-writable and
    /// non-configurable, keeping its original enumerability. Globals already
    /// in that shape are left alone; globals the host froze with a live
    /// value cannot be redefined and are only logged.
    pub fn scrub_pass(&self, trigger: &str) -> usize {
        self.status.passes.fetch_add(1, Ordering::SeqCst);
        let mut scrubbed = 0;
        for name in &self.names {
            let Some(current) = self.scope.get_own_property(name) else {
                continue;
            };
            if current.is_scrubbed() {
                continue;
            }
            if !self.status.tauri_globals_present.swap(true, Ordering::SeqCst) {
                info!(global = %name, %trigger, "privileged global observed in extension context");
            }
            let replacement = PropertyDescriptor {
                value: JsValue::Undefined,
                writable: false,
                enumerable: current.enumerable,
                configurable: false,
            };
            match self.scope.define_property(name, replacement) {
                Ok(()) => {
                    scrubbed += 1;
                    self.status.scrubbed.fetch_add(1, Ordering::SeqCst);
                    debug!(global = %name, %trigger, "privileged global scrubbed");
                }
                Err(e) => warn!(global = %name, %trigger, error = %e, "privileged global could not be scrubbed"),
            }
        }
        scrubbed
    }

    /// Run the immediate pass now and schedule the two deferred passes.
    /// Must be called inside a tokio runtime.
    pub fn harden(self, schedule: HardeningSchedule) -> HardeningHandle {
        let hardener = Arc::new(self);
        hardener.scrub_pass("immediate");

        let deferred = hardener.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(schedule.short).await;
            deferred.scrub_pass("short-timer");
            tokio::time::sleep(schedule.long.saturating_sub(schedule.short)).await;
            deferred.scrub_pass("long-timer");
        });

        HardeningHandle { hardener, task }
    }
}

/// A hardened context. Dropping it cancels any passes not yet run.
pub struct HardeningHandle {
    hardener: Arc<Hardener>,
    task: JoinHandle<()>,
}

impl HardeningHandle {
    /// Call when the context fires its `load` event.
    pub fn on_load(&self) -> usize {
        self.hardener.scrub_pass("load")
    }

    pub fn status(&self) -> Arc<SandboxStatus> {
        self.hardener.status()
    }

    /// Whether both deferred passes have run.
    pub fn schedule_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HardeningHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
