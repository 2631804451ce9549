//! Call-site registry.
//!
//! Every logging statement owns a static [`CallSite`]. The first time a
//! statement reaches a logger, the logger's [`Registry`] compiles its format,
//! assigns it the next id and queues the resulting [`CallSiteInfo`] for the
//! poller. The id is cached in the call site itself, so every later call
//! resolves it with a single atomic load.
//!
//! # Thread Safety
//!
//! The slow path is serialized by one mutex per registry. It is only taken the
//! first time a call site meets a given logger, never on the steady-state hot
//! path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fragment::{self, FragmentProgram};
use crate::level::LogLevel;
use crate::loggable::Loggable;

/// Cached in a [`CallSite`] whose format failed to compile.
pub const DISABLED: u32 = u32::MAX;

/// Static state of one logging statement.
///
/// Built in a `static` by [`fast_log!`](crate::fast_log); the `cache` word
/// holds the id assigned by the last logger that resolved this site, tagged
/// with that logger's instance id in the upper 32 bits.
#[derive(Debug)]
pub struct CallSite {
    file: &'static str,
    line: u32,
    level: LogLevel,
    format: &'static str,
    arg_count: usize,
    cache: AtomicU64,
}

impl CallSite {
    pub const fn new(
        file: &'static str,
        line: u32,
        level: LogLevel,
        format: &'static str,
        arg_count: usize,
    ) -> Self {
        Self {
            file,
            line,
            level,
            format,
            arg_count,
            cache: AtomicU64::new(0),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    #[inline]
    fn cached(&self, instance: u32) -> Option<u32> {
        let word = self.cache.load(Ordering::Relaxed);
        ((word >> 32) as u32 == instance).then_some(word as u32)
    }

    fn store(&self, instance: u32, id: u32) {
        self.cache
            .store(((instance as u64) << 32) | id as u64, Ordering::Relaxed);
    }
}

/// Immutable record of a compiled call site, shared with the poller.
#[derive(Debug)]
pub struct CallSiteInfo {
    pub id: u32,
    pub file: &'static str,
    pub line: u32,
    pub level: LogLevel,
    pub format: &'static str,
    pub program: FragmentProgram,
}

#[derive(Default)]
struct RegistryState {
    /// Keyed by call-site address; `None` marks a site that failed to compile.
    by_site: HashMap<usize, Option<u32>>,
    pending: Vec<Arc<CallSiteInfo>>,
    next_id: u32,
    compile_failures: u64,
}

pub struct Registry {
    instance: u32,
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Creates an empty registry for the logger with the given instance id.
    ///
    /// Instance ids must be non-zero and unique among live loggers.
    pub fn new(instance: u32) -> Self {
        debug_assert_ne!(instance, 0, "instance id 0 is reserved");
        Self {
            instance,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Returns the id of `site`, compiling its format on first use.
    ///
    /// On first use the kinds of `args` are also checked against the format's
    /// conversions; later calls from the same statement carry the same types.
    /// Returns `None` if the format does not compile or the arguments do not
    /// fit it; the failure is reported once through `tracing` and the site
    /// stays disabled for this registry.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fast_logger::registry::{CallSite, Registry};
    /// # use fast_logger::LogLevel;
    /// static SITE: CallSite = CallSite::new(file!(), line!(), LogLevel::Info, "x=%d", 1);
    /// let registry = Registry::new(1);
    /// let id = registry.resolve(&SITE, &[&5]);
    /// assert_eq!(id, Some(0));
    /// assert_eq!(registry.resolve(&SITE, &[&6]), id);
    /// assert_eq!(registry.drain_pending().len(), 1);
    /// ```
    #[inline]
    pub fn resolve(&self, site: &'static CallSite, args: &[&dyn Loggable]) -> Option<u32> {
        match site.cached(self.instance) {
            Some(DISABLED) => None,
            Some(id) => Some(id),
            None => self.resolve_slow(site, args),
        }
    }

    #[cold]
    fn resolve_slow(&self, site: &'static CallSite, args: &[&dyn Loggable]) -> Option<u32> {
        let key = site as *const CallSite as usize;
        let mut state = self.state.lock();

        let existing = state.by_site.get(&key).copied();
        let resolved = match existing {
            Some(resolved) => resolved,
            None => {
                let compiled = fragment::compile(site.format, site.arg_count).and_then(|program| {
                    program.check_arguments(args.iter().map(|arg| arg.kind()))?;
                    Ok(program)
                });
                let resolved = match compiled {
                    Ok(program) => {
                        let id = state.next_id;
                        debug_assert!(id < DISABLED, "call-site id space exhausted");
                        state.next_id += 1;
                        state.pending.push(Arc::new(CallSiteInfo {
                            id,
                            file: site.file,
                            line: site.line,
                            level: site.level,
                            format: site.format,
                            program,
                        }));
                        tracing::trace!(id, file = site.file, line = site.line, "registered call site");
                        Some(id)
                    }
                    Err(err) => {
                        tracing::error!(
                            file = site.file,
                            line = site.line,
                            format = site.format,
                            error = %err,
                            "log format failed to compile, call site disabled"
                        );
                        state.compile_failures += 1;
                        None
                    }
                };
                state.by_site.insert(key, resolved);
                resolved
            }
        };

        site.store(self.instance, resolved.unwrap_or(DISABLED));
        resolved
    }

    /// Takes the call sites registered since the last drain, in id order.
    pub fn drain_pending(&self) -> Vec<Arc<CallSiteInfo>> {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Number of ids handed out so far.
    pub fn assigned(&self) -> u32 {
        self.state.lock().next_id
    }

    pub fn compile_failures(&self) -> u64 {
        self.state.lock().compile_failures
    }
}
