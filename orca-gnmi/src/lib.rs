//! gNMI (gRPC Network Management Interface) Get client for ORCA
//!
//! Opens a plaintext channel to a device, attaches `username`/`password`
//! metadata, and polls a set of configuration paths with unary `Get` calls.
//! Outcomes are delivered asynchronously to a [`ResponseHandler`], tagged
//! with the [`CallId`] of the call they belong to.

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod path;
pub mod poller;

// Include the generated protobuf code
pub mod gnmi {
    tonic::include_proto!("gnmi");
}

pub use channel::{AuthenticatedStub, ChannelManager};
pub use config::GnmiPollerConfig;
pub use dispatcher::{
    CallId, GetOptions, GetTransport, PendingCall, RequestDispatcher, build_get_request,
    build_get_request_with,
};
pub use error::GnmiError;
pub use handler::{LoggingHandler, ResponseHandler};
pub use path::{build_path, path_to_string};
pub use poller::{PollReport, Poller, TickOutcome, TickReport};
