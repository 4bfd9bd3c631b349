//! Structured, per-actor logging.
//!
//! A forked or remote actor cannot carry a trait object across a process
//! boundary - it needs to reconstruct an equivalent logger from a name.
//! `LoggerRegistry` is a by-name registry of `fn() -> Arc<dyn LogSink>`
//! constructors, the same trick `behavior.rs` uses for cross-process
//! behaviors. In-process, nothing changes: a `LogHandle` is cheap to clone
//! and wraps a `slog::Logger`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use slog::Drain;

use crate::error::ConfigError;

/// Severity gate. Ordered so a category's configured `Level` allows every
/// variant at or below it in this list (`Debug` is the most verbose).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Silent,
    Error,
    Warn,
    Info,
    Debug,
}

/// A single emitted log line, already formatted; sinks decide how to render
/// and where to send it.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub actor: String,
    pub body: String,
}

/// The pluggable logging backend. Implementors receive already-gated,
/// already-formatted records - `LogHandle` and `SinkDrain` both enforce the
/// configured `Level` before a record ever reaches a sink, so a `LogSink`
/// never needs to filter.
pub trait LogSink: Send + Sync + Any {
    fn error(&self, record: LogRecord);
    fn warn(&self, record: LogRecord);
    fn info(&self, record: LogRecord);
    fn debug(&self, record: LogRecord);

    /// Exposed so tests can downcast a `LoggerFactory`'s implementation back
    /// to a concrete capturing sink and assert on what it collected.
    fn as_any(&self) -> &dyn Any;
}

/// Constructor recorded in the `LoggerRegistry`. A bare `fn` pointer rather
/// than a closure: a forked worker relinks the same binary and needs to call
/// the identical constructor by name, so it cannot capture parent-process
/// state.
pub type LoggerCtor = fn() -> Arc<dyn LogSink>;

/// Process-wide table of named logger constructors, resolved once at
/// `ActorSystem` construction and again, independently, inside any forked
/// worker that names the same logger.
pub struct LoggerRegistry;

fn registry() -> &'static Mutex<HashMap<&'static str, LoggerCtor>> {
    static REGISTRY: OnceLock<Mutex<HashMap<&'static str, LoggerCtor>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl LoggerRegistry {
    /// Register a logger under `name`. Call this from an application's
    /// startup path (before `ActorSystem` construction and, for forked
    /// placement, before `worker::run_if_worker` too) so the name resolves
    /// identically on both sides of a process boundary.
    pub fn register(name: &'static str, ctor: LoggerCtor) {
        registry().lock().unwrap().insert(name, ctor);
    }

    /// Construct a fresh sink instance from a previously registered name.
    pub fn resolve(name: &str) -> Result<Arc<dyn LogSink>, ConfigError> {
        registry()
            .lock()
            .unwrap()
            .get(name)
            .map(|ctor| ctor())
            .ok_or(ConfigError::InvalidLoggerInterface { missing: "sink" })
    }
}

/// Which logger a `SystemConfig` should use: the built-in terminal sink, or
/// one previously registered in the `LoggerRegistry`.
#[derive(Debug, Clone)]
pub enum LoggerRef {
    Default,
    Named(String),
}

impl Default for LoggerRef {
    fn default() -> Self {
        LoggerRef::Default
    }
}

/// Default sink: a `slog::Logger` over a terminal/async drain stack
/// (`TermDecorator` -> `FullFormat` -> `Fuse` -> `Async` -> `Fuse`).
struct TerminalSink(slog::Logger);

impl TerminalSink {
    fn new() -> Self {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        TerminalSink(slog::Logger::root(drain, slog::o!()))
    }
}

impl LogSink for TerminalSink {
    fn error(&self, r: LogRecord) {
        slog::error!(self.0, "{}", r.body; "actor" => r.actor);
    }
    fn warn(&self, r: LogRecord) {
        slog::warn!(self.0, "{}", r.body; "actor" => r.actor);
    }
    fn info(&self, r: LogRecord) {
        slog::info!(self.0, "{}", r.body; "actor" => r.actor);
    }
    fn debug(&self, r: LogRecord) {
        slog::debug!(self.0, "{}", r.body; "actor" => r.actor);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A `LogSink` that discards everything; used for `LogHandle::test_sink` and
/// anywhere a test needs a handle but not its output.
struct NullSink;

impl LogSink for NullSink {
    fn error(&self, _: LogRecord) {}
    fn warn(&self, _: LogRecord) {}
    fn info(&self, _: LogRecord) {}
    fn debug(&self, _: LogRecord) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adapts an `Arc<dyn LogSink>` into a `slog::Drain` so application code can
/// use `slog::info!(handle.inner(), ...)` interchangeably with
/// `handle.info(...)`; both paths apply the same `Level` gate.
struct SinkDrain {
    sink: Arc<dyn LogSink>,
    actor: String,
    level: Level,
}

impl Drain for SinkDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record,
        _values: &slog::OwnedKVList,
    ) -> Result<Self::Ok, Self::Err> {
        let msg_level = match record.level() {
            slog::Level::Critical | slog::Level::Error => Level::Error,
            slog::Level::Warning => Level::Warn,
            slog::Level::Info => Level::Info,
            slog::Level::Debug | slog::Level::Trace => Level::Debug,
        };
        if self.level < msg_level {
            return Ok(());
        }
        let body = format!("{}", record.msg());
        let rec = LogRecord {
            actor: self.actor.clone(),
            body,
        };
        match msg_level {
            Level::Error => self.sink.error(rec),
            Level::Warn => self.sink.warn(rec),
            Level::Info => self.sink.info(rec),
            Level::Debug => self.sink.debug(rec),
            Level::Silent => unreachable!("Silent is never a record's own level"),
        }
        Ok(())
    }
}

/// A per-actor logging handle. Cheap to clone (an `Arc<dyn LogSink>` plus a
/// `slog::Logger` wrapping the same sink), handed to every actor's context
/// and to the system's own bookkeeping (`ResourceRegistry::destroy_all`).
#[derive(Clone)]
pub struct LogHandle {
    actor: String,
    level: Level,
    sink: Arc<dyn LogSink>,
    slog: slog::Logger,
}

impl LogHandle {
    fn new(actor: String, level: Level, sink: Arc<dyn LogSink>) -> Self {
        let drain = SinkDrain {
            sink: sink.clone(),
            actor: actor.clone(),
            level,
        };
        let slog = slog::Logger::root(std::sync::Mutex::new(drain).fuse(), slog::o!());
        LogHandle {
            actor,
            level,
            sink,
            slog,
        }
    }

    /// A handle backed by a discarding sink, for unit tests that need a
    /// `LogHandle` but do not assert on its output.
    pub fn test_sink(actor: &str) -> Self {
        LogHandle::new(actor.to_string(), Level::Debug, Arc::new(NullSink))
    }

    pub fn error(&self, msg: impl Into<String>) {
        self.emit(Level::Error, msg.into());
    }

    pub fn warn(&self, msg: impl Into<String>) {
        self.emit(Level::Warn, msg.into());
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.emit(Level::Info, msg.into());
    }

    pub fn debug(&self, msg: impl Into<String>) {
        self.emit(Level::Debug, msg.into());
    }

    fn emit(&self, msg_level: Level, body: String) {
        if self.level < msg_level {
            return;
        }
        let record = LogRecord {
            actor: self.actor.clone(),
            body,
        };
        match msg_level {
            Level::Error => self.sink.error(record),
            Level::Warn => self.sink.warn(record),
            Level::Info => self.sink.info(record),
            Level::Debug => self.sink.debug(record),
            Level::Silent => unreachable!("Silent is never emitted"),
        }
    }

    /// The underlying `slog::Logger`, for code that prefers `slog`'s
    /// macros (`slog::info!(handle.inner(), "..."; "k" => v)`) over the
    /// plain-string methods above.
    pub fn inner(&self) -> &slog::Logger {
        &self.slog
    }

    /// The concrete sink instance backing this handle, for tests that want
    /// to assert on a custom sink's captured output.
    pub fn implementation(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("actor", &self.actor)
            .field("level", &self.level)
            .finish()
    }
}

/// Builds per-actor `LogHandle`s, gating each actor's effective `Level` by an
/// exact-path override table falling back to a system-wide default: the
/// most specific entry wins, else the default applies.
#[derive(Clone)]
pub struct LoggerFactory {
    sink: Arc<dyn LogSink>,
    default_level: Level,
    categories: Arc<HashMap<String, Level>>,
}

impl LoggerFactory {
    pub fn new(logger: LoggerRef, default_level: Level) -> Result<Self, ConfigError> {
        let sink = match logger {
            LoggerRef::Default => Arc::new(TerminalSink::new()) as Arc<dyn LogSink>,
            LoggerRef::Named(name) => LoggerRegistry::resolve(&name)?,
        };
        Ok(LoggerFactory {
            sink,
            default_level,
            categories: Arc::new(HashMap::new()),
        })
    }

    pub fn with_categories(mut self, categories: HashMap<String, Level>) -> Self {
        self.categories = Arc::new(categories);
        self
    }

    /// Build the handle a newly constructed actor at `path` should receive,
    /// gated by `loggerConfig.categories[category]` (falling back to the
    /// configured default). `category` is the actor's *name* (§4.2) - the
    /// sibling-unique name it was given at `createChild` time, or, for the
    /// root actor, its configured behavior's name - which is not always
    /// `path`'s last segment, so callers pass it explicitly rather than
    /// have it re-derived here.
    pub fn handle_for(&self, path: &str, category: &str) -> LogHandle {
        let level = self
            .categories
            .get(category)
            .copied()
            .unwrap_or(self.default_level);
        LogHandle::new(path.to_string(), level, self.sink.clone())
    }

    /// The sink instance in use, for tests asserting on a custom logger's
    /// captured output without going through any particular actor's handle.
    pub fn implementation(&self) -> Arc<dyn LogSink> {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CapturingSink(StdMutex<Vec<String>>);

    impl LogSink for CapturingSink {
        fn error(&self, r: LogRecord) {
            self.0.lock().unwrap().push(format!("ERROR {}", r.body));
        }
        fn warn(&self, r: LogRecord) {
            self.0.lock().unwrap().push(format!("WARN {}", r.body));
        }
        fn info(&self, r: LogRecord) {
            self.0.lock().unwrap().push(format!("INFO {}", r.body));
        }
        fn debug(&self, r: LogRecord) {
            self.0.lock().unwrap().push(format!("DEBUG {}", r.body));
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn handle_with(level: Level) -> (LogHandle, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink(StdMutex::new(Vec::new())));
        let handle = LogHandle::new("actor".into(), level, sink.clone());
        (handle, sink)
    }

    #[test]
    fn info_level_suppresses_debug() {
        let (handle, sink) = handle_with(Level::Info);
        handle.debug("should not appear");
        handle.info("should appear");
        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("should appear"));
    }

    #[test]
    fn silent_suppresses_everything() {
        let (handle, sink) = handle_with(Level::Silent);
        handle.error("nope");
        handle.warn("nope");
        handle.info("nope");
        handle.debug("nope");
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn category_override_beats_default() {
        let sink = Arc::new(CapturingSink(StdMutex::new(Vec::new())));
        let mut categories = HashMap::new();
        categories.insert("quiet".to_string(), Level::Silent);
        let factory = LoggerFactory {
            sink: sink.clone(),
            default_level: Level::Debug,
            categories: Arc::new(categories),
        };
        factory.handle_for("/quiet", "quiet").error("suppressed");
        factory.handle_for("/loud", "loud").error("shown");
        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("shown"));
    }

    #[test]
    fn category_keyed_by_name_not_path() {
        // Two actors sharing a name at different tree positions gate
        // identically, since `loggerConfig.categories` is a name -> level
        // map, not a path -> level map (§4.2).
        let sink = Arc::new(CapturingSink(StdMutex::new(Vec::new())));
        let mut categories = HashMap::new();
        categories.insert("worker".to_string(), Level::Silent);
        let factory = LoggerFactory {
            sink: sink.clone(),
            default_level: Level::Debug,
            categories: Arc::new(categories),
        };
        factory.handle_for("/pool-a/worker", "worker").error("a");
        factory.handle_for("/pool-b/worker", "worker").error("b");
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn unregistered_named_logger_is_invalid_interface() {
        let err = LoggerFactory::new(LoggerRef::Named("does-not-exist".into()), Level::Info)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLoggerInterface { .. }));
    }

    #[test]
    fn slog_macros_respect_the_same_gate() {
        let (handle, sink) = handle_with(Level::Warn);
        slog::debug!(handle.inner(), "filtered");
        slog::error!(handle.inner(), "kept");
        let lines = sink.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("kept"));
    }
}
