use std::future::Future;

use crate::config::RequestSpec;

use super::error::StepError;
use super::events::EventBus;
use super::vu::VuContext;

/// The protocol seam. One engine serves a whole run; every VU gets its own
/// `Session`.
///
/// Contract: `request` must emit `Request` on the bus before issuing I/O,
/// then `Response { latency, code, vu_id }` on completion or
/// `Error { code }` on failure — that is what keeps the aggregator
/// protocol-agnostic. The runner guarantees `open` and `close` are called
/// exactly once per VU, on the success and failure paths alike.
pub trait Engine: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Establish whatever the protocol needs before the first step (e.g.
    /// a connection). A failure here aborts the VU before any step runs.
    fn open(
        &self,
        ctx: &mut VuContext,
    ) -> impl Future<Output = Result<Self::Session, StepError>> + Send;

    fn request(
        &self,
        session: &mut Self::Session,
        spec: &RequestSpec,
        ctx: &mut VuContext,
        bus: &EventBus,
    ) -> impl Future<Output = Result<(), StepError>> + Send;

    /// Release the session. Consumes it, so a double close cannot compile.
    fn close(&self, session: Self::Session) -> impl Future<Output = ()> + Send;
}
