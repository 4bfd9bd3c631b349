//! Helper binary for the forked-placement integration tests.
//!
//! `tests/integration.rs` launches this binary via
//! `Placement::Forked { program: Some(env!("CARGO_BIN_EXE_actorhost_test_worker")), .. }`
//! instead of re-executing the test harness itself. It registers the one
//! behavior and one logger the test suite needs reconstructed by name, then
//! hands off to `actorhost::worker::run_if_worker`.

use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use actorhost::behavior::{Behavior, BehaviorRegistry};
use actorhost::context::ActorContext;
use actorhost::error::{ActorError, CreateError};
use actorhost::logging::{LogRecord, LogSink, LoggerRegistry};
use actorhost::payload::Payload;
use actorhost::resource::ResourceRegistry;

/// Answers the handful of topics the integration suite probes a forked or
/// clustered-forked replica with: its own pid, an echo into its logger, and
/// a readback of whatever that logger captured.
struct TestWorker;

#[async_trait]
impl Behavior for TestWorker {
    async fn handle(
        &mut self,
        topic: &str,
        payload: Payload,
        ctx: &ActorContext,
    ) -> Result<Option<Payload>, ActorError> {
        match topic {
            "getPid" => Ok(Some(Payload::new(std::process::id()))),
            "test" => {
                let msg: String = payload
                    .downcast()
                    .map_err(|_| ActorError::HandlerFailure("expected a string payload".into()))?;
                ctx.log().info(msg);
                Ok(None)
            }
            "getLoggerMessages" => {
                let sink = ctx.log().implementation();
                let capturing = sink
                    .as_any()
                    .downcast_ref::<CapturingSink>()
                    .expect("worker process resolved the capturing sink by the same registered name");
                Ok(Some(Payload::new(capturing.info_messages())))
            }
            "kill" => std::process::exit(1),
            other => Err(ActorError::HandlerFailure(format!(
                "test worker has no handler for `{other}`"
            ))),
        }
    }
}

fn test_worker_ctor(_deps: &ResourceRegistry) -> Result<Box<dyn Behavior>, CreateError> {
    Ok(Box::new(TestWorker))
}

#[derive(Default)]
struct CapturingSink(Mutex<Vec<String>>);

impl CapturingSink {
    fn info_messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl LogSink for CapturingSink {
    fn error(&self, _: LogRecord) {}
    fn warn(&self, _: LogRecord) {}
    fn info(&self, r: LogRecord) {
        self.0.lock().unwrap().push(r.body);
    }
    fn debug(&self, _: LogRecord) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn capturing_sink_ctor() -> Arc<dyn LogSink> {
    Arc::new(CapturingSink::default())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    BehaviorRegistry::register("test-worker", test_worker_ctor);
    LoggerRegistry::register("test-capturing", capturing_sink_ctor);
    actorhost::worker::run_if_worker().await;
}
