//! Channel ownership and authenticated gNMI stubs

use std::time::Duration;

use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::config::{Credentials, DeviceConfig};
use crate::dispatcher::GetTransport;
use crate::error::GnmiError;
use crate::gnmi::{GetRequest, GetResponse, g_nmi_client::GNmiClient};

/// Generated gNMI client wrapped with the credentials interceptor.
pub type GnmiClient = GNmiClient<InterceptedService<Channel, CredentialsInterceptor>>;

/// Owns the transport channel to one device.
///
/// The channel connects lazily on first use, so opening never touches the
/// network. It is released when the manager is closed or dropped and every
/// stub handed out by [`attach_credentials`](Self::attach_credentials) is gone.
#[derive(Debug)]
pub struct ChannelManager {
    uri: String,
    channel: Channel,
    request_timeout: Option<Duration>,
}

impl ChannelManager {
    /// Open a plaintext channel to `address:port`.
    pub fn open(address: &str, port: u16) -> Result<Self, GnmiError> {
        let uri = endpoint_uri(address, port)?;
        let endpoint = Self::endpoint(address, &uri)?;
        Ok(Self::from_endpoint(uri, endpoint, None))
    }

    /// Open a channel using the device settings, including timeouts.
    pub fn from_device(device: &DeviceConfig) -> Result<Self, GnmiError> {
        let uri = endpoint_uri(&device.address, device.port)?;
        let mut endpoint = Self::endpoint(&device.address, &uri)?;

        if let Some(ms) = device.connect_timeout_ms {
            endpoint = endpoint.connect_timeout(Duration::from_millis(ms));
        }

        Ok(Self::from_endpoint(
            uri,
            endpoint,
            device.request_timeout_ms.map(Duration::from_millis),
        ))
    }

    fn endpoint(address: &str, uri: &str) -> Result<Endpoint, GnmiError> {
        Endpoint::from_shared(uri.to_string()).map_err(|e| GnmiError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
    }

    fn from_endpoint(uri: String, endpoint: Endpoint, request_timeout: Option<Duration>) -> Self {
        let channel = endpoint.connect_lazy();
        info!(uri = %uri, "Opened gNMI channel");

        Self {
            uri,
            channel,
            request_timeout,
        }
    }

    /// Endpoint URI of the channel.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// A stub whose calls carry `username` and `password` metadata.
    ///
    /// Only the header encoding is checked here. Whether the device accepts
    /// the credentials is only known from the outcome of a call.
    pub fn attach_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthenticatedStub, GnmiError> {
        let username = AsciiMetadataValue::try_from(username)
            .map_err(|_| GnmiError::InvalidMetadata { key: "username" })?;
        let password = AsciiMetadataValue::try_from(password)
            .map_err(|_| GnmiError::InvalidMetadata { key: "password" })?;

        warn!(uri = %self.uri, "Credentials are sent as plaintext metadata");

        Ok(self.build_stub(CredentialsInterceptor {
            credentials: Some((username, password)),
        }))
    }

    /// A stub for the configured credentials, or a bare one when there are none.
    pub fn stub_for(&self, credentials: Option<&Credentials>) -> Result<AuthenticatedStub, GnmiError> {
        match credentials {
            Some(creds) => self.attach_credentials(&creds.username, &creds.password),
            None => Ok(self.stub()),
        }
    }

    /// A stub that sends no credentials.
    pub fn stub(&self) -> AuthenticatedStub {
        self.build_stub(CredentialsInterceptor { credentials: None })
    }

    fn build_stub(&self, interceptor: CredentialsInterceptor) -> AuthenticatedStub {
        AuthenticatedStub {
            client: GNmiClient::with_interceptor(self.channel.clone(), interceptor),
            request_timeout: self.request_timeout,
        }
    }

    /// Release the channel.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        debug!(uri = %self.uri, "Releasing gNMI channel");
    }
}

fn endpoint_uri(address: &str, port: u16) -> Result<String, GnmiError> {
    let invalid = |message: &str| GnmiError::InvalidAddress {
        address: address.to_string(),
        message: message.to_string(),
    };

    let address = address.trim();
    if address.is_empty() {
        return Err(invalid("address is empty"));
    }
    if address.contains("://") {
        return Err(invalid("address must not include a scheme"));
    }
    if port == 0 {
        return Err(invalid("port must not be 0"));
    }

    // Bare IPv6 literals need brackets inside a URI
    if address.contains(':') && !address.starts_with('[') {
        Ok(format!("http://[{}]:{}", address, port))
    } else {
        Ok(format!("http://{}:{}", address, port))
    }
}

/// Inserts the credential headers into every outgoing request.
#[derive(Clone)]
pub struct CredentialsInterceptor {
    credentials: Option<(AsciiMetadataValue, AsciiMetadataValue)>,
}

impl std::fmt::Debug for CredentialsInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsInterceptor")
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

impl Interceptor for CredentialsInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some((username, password)) = &self.credentials {
            request.metadata_mut().insert("username", username.clone());
            request.metadata_mut().insert("password", password.clone());
        }
        Ok(request)
    }
}

/// gNMI client bound to a channel, with credentials attached.
#[derive(Debug, Clone)]
pub struct AuthenticatedStub {
    client: GnmiClient,
    request_timeout: Option<Duration>,
}

impl GetTransport for AuthenticatedStub {
    async fn get(&mut self, request: GetRequest) -> Result<GetResponse, Status> {
        let mut request = Request::new(request);
        if let Some(timeout) = self.request_timeout {
            request.set_timeout(timeout);
        }

        self.client.get(request).await.map(Response::into_inner)
    }
}
