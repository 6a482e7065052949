//! Get request assembly and non-blocking dispatch

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;
use tonic::Status;
use tracing::debug;

use crate::config::{DataType, GnmiEncoding};
use crate::error::GnmiError;
use crate::gnmi::{GetRequest, GetResponse, Path};
use crate::handler::ResponseHandler;

/// Identifies one dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

impl CallId {
    pub fn value(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Data type and encoding carried by a Get request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub data_type: DataType,
    pub encoding: GnmiEncoding,
}

/// Build a Get request for `paths`, keeping their order.
pub fn build_get_request(paths: Vec<Path>) -> GetRequest {
    build_get_request_with(paths, GetOptions::default())
}

/// Build a Get request with an explicit data type and encoding.
pub fn build_get_request_with(paths: Vec<Path>, options: GetOptions) -> GetRequest {
    GetRequest {
        path: paths,
        r#type: options.data_type.to_proto(),
        encoding: options.encoding.to_proto(),
        ..Default::default()
    }
}

/// Something that can carry a unary gNMI Get.
///
/// Implemented by [`AuthenticatedStub`](crate::channel::AuthenticatedStub);
/// tests substitute their own transports.
pub trait GetTransport: Clone + Send + Sync + 'static {
    fn get(
        &mut self,
        request: GetRequest,
    ) -> impl Future<Output = Result<GetResponse, Status>> + Send;
}

/// Completion handle for one dispatched call.
#[derive(Debug)]
pub struct PendingCall {
    id: CallId,
    outcome: oneshot::Receiver<Result<GetResponse, GnmiError>>,
}

impl PendingCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Wait for the call to finish.
    pub async fn wait(mut self) -> Result<GetResponse, GnmiError> {
        self.finished().await
    }

    /// Wait for the call without consuming the handle.
    ///
    /// Dropping the returned future before it resolves leaves the handle
    /// usable. Must not be awaited again once it has resolved.
    pub async fn finished(&mut self) -> Result<GetResponse, GnmiError> {
        let id = self.id;
        (&mut self.outcome)
            .await
            .unwrap_or_else(|_| Err(GnmiError::Abandoned(id)))
    }

    /// The outcome if the call has already finished.
    pub fn try_outcome(&mut self) -> Option<Result<GetResponse, GnmiError>> {
        match self.outcome.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(GnmiError::Abandoned(self.id))),
        }
    }
}

/// Issues Get calls without waiting for them.
///
/// Each call runs on its own task. The handler sees every event tagged with
/// the call's [`CallId`], then the matching [`PendingCall`] is fulfilled.
pub struct RequestDispatcher<T> {
    transport: T,
    handler: Arc<dyn ResponseHandler>,
    next_id: AtomicU64,
}

impl<T: GetTransport> RequestDispatcher<T> {
    pub fn new(transport: T, handler: Arc<dyn ResponseHandler>) -> Self {
        Self {
            transport,
            handler,
            next_id: AtomicU64::new(1),
        }
    }

    /// Dispatch `request` and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn send_get(&self, request: GetRequest) -> PendingCall {
        let id = CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let mut transport = self.transport.clone();
        let handler = self.handler.clone();

        debug!(call = %id, paths = request.path.len(), "Dispatching gNMI Get");

        tokio::spawn(async move {
            let outcome = transport.get(request).await.map_err(GnmiError::from);

            match &outcome {
                Ok(response) => {
                    handler.on_value(id, response);
                    handler.on_complete(id);
                }
                Err(err) => handler.on_error(id, err),
            }

            // The caller may have stopped listening
            let _ = tx.send(outcome);
        });

        PendingCall { id, outcome: rx }
    }
}

impl<T> fmt::Debug for RequestDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}
