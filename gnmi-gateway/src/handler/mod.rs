//! gNMI request handling.
//!
//! Each RPC is a short synchronous state machine against the datastore:
//! open a session, translate paths and values, run batched calls, release the
//! session. The datastore API is blocking, so that work runs on tokio's
//! blocking pool and the async service methods only await its outcome.
//! Subscribe streams wait for client messages on the async side and only
//! borrow a blocking thread for each datastore call.

mod capabilities;
mod get;
mod set;
mod subscribe;

pub use capabilities::{GNMI_VERSION, SUPPORTED_ENCODING};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

use crate::config::GatewaySettings;
use crate::datastore::{Datastore, DatastoreRegistry};
use crate::error::{GatewayError, Result};
use crate::event::{ChangeEvent, EventReceiver};
use crate::gnmi::g_nmi_server::GNmi;
use crate::gnmi::{
    CapabilityRequest, CapabilityResponse, GetRequest, GetResponse, SetRequest, SetResponse,
    SubscribeRequest, SubscribeResponse,
};
use crate::subscribers::SubscriberRegistry;

/// The gNMI service, bound to one datastore instance.
#[derive(Clone)]
pub struct GnmiService {
    datastore: Arc<dyn Datastore>,
    subscribers: Arc<SubscriberRegistry>,
    settings: GatewaySettings,
}

impl GnmiService {
    /// Create a service over `datastore`.
    pub fn new(datastore: Arc<dyn Datastore>, settings: GatewaySettings) -> Self {
        Self {
            datastore,
            subscribers: Arc::new(SubscriberRegistry::new()),
            settings,
        }
    }

    /// Create a service over the instance named in `settings`.
    pub fn from_registry(registry: &DatastoreRegistry, settings: GatewaySettings) -> Result<Self> {
        let datastore = registry.get(&settings.datastore)?;
        Ok(Self::new(datastore, settings))
    }

    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    /// Run one blocking RPC body with the configured deadline.
    ///
    /// When the deadline passes the body is asked to stop at its next
    /// checkpoint, and the reported outcome is whatever it actually did.
    async fn run_blocking<T, F>(
        &self,
        rpc: &'static str,
        body: F,
    ) -> std::result::Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Datastore, &CancelFlag) -> Result<T> + Send + 'static,
    {
        let datastore = self.datastore.clone();
        let cancel = CancelFlag::default();
        let body_cancel = cancel.clone();
        let mut task =
            tokio::task::spawn_blocking(move || body(datastore.as_ref(), &body_cancel));

        let joined = match self.settings.request_timeout() {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        rpc,
                        timeout_ms = self.settings.request_timeout_ms,
                        "RPC deadline exceeded, stopping at next checkpoint"
                    );
                    cancel.cancel();
                    task.await
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(response)) => {
                if cancel.is_cancelled() {
                    info!(rpc, "RPC completed after its deadline");
                }
                debug!(rpc, "RPC completed");
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(rpc, error = %e, "RPC failed");
                Err(e.into())
            }
            Err(e) => {
                error!(rpc, error = %e, "RPC task aborted");
                Err(Status::internal(format!("{} aborted", rpc)))
            }
        }
    }

    /// Serve a Subscribe stream.
    ///
    /// The inbound read loop runs as an async task that owns the datastore
    /// session; notifications reach the client through the returned stream.
    pub fn start_subscription<S>(
        &self,
        inbound: S,
    ) -> ReceiverStream<std::result::Result<SubscribeResponse, Status>>
    where
        S: Stream<Item = std::result::Result<SubscribeRequest, Status>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.settings.subscribe_buffer);
        let id = self.subscribers.register(tx.clone());
        let datastore = self.datastore.clone();
        let subscribers = self.subscribers.clone();
        let receiver: Arc<dyn EventReceiver<ChangeEvent>> = subscribers.clone();

        tokio::spawn(async move {
            info!(subscriber = %id, "Subscribe stream opened");
            let result = subscribe::serve(datastore, receiver, id, inbound).await;
            subscribers.unregister(id);

            match result {
                Ok(()) => info!(subscriber = %id, "Subscribe stream closed"),
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Subscribe stream aborted");
                    if tx.try_send(Err(e.into())).is_err() {
                        debug!(subscriber = %id, "Could not report failure to client");
                    }
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

/// Stop request shared between an RPC and its blocking body.
///
/// Bodies call [`check`](Self::check) before every datastore call that
/// changes state, so a cancelled Set never reaches its commit.
#[derive(Debug, Clone, Default)]
struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, step: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(GatewayError::DeadlineExceeded(format!("stopped before {}", step)));
        }
        Ok(())
    }
}

/// Run one datastore call on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| GatewayError::session(format!("datastore call aborted: {}", e)))?
}

#[tonic::async_trait]
impl GNmi for GnmiService {
    async fn capabilities(
        &self,
        _request: Request<CapabilityRequest>,
    ) -> std::result::Result<Response<CapabilityResponse>, Status> {
        let response = self
            .run_blocking("capabilities", |datastore, _| {
                capabilities::capabilities(datastore)
            })
            .await?;
        Ok(Response::new(response))
    }

    async fn get(
        &self,
        request: Request<GetRequest>,
    ) -> std::result::Result<Response<GetResponse>, Status> {
        let request = request.into_inner();
        let response = self
            .run_blocking("get", move |datastore, cancel| {
                get::get(datastore, &request, cancel)
            })
            .await?;
        Ok(Response::new(response))
    }

    async fn set(
        &self,
        request: Request<SetRequest>,
    ) -> std::result::Result<Response<SetResponse>, Status> {
        let request = request.into_inner();
        let response = self
            .run_blocking("set", move |datastore, cancel| {
                set::set(datastore, &request, cancel)
            })
            .await?;
        Ok(Response::new(response))
    }

    type SubscribeStream = ReceiverStream<std::result::Result<SubscribeResponse, Status>>;

    async fn subscribe(
        &self,
        request: Request<Streaming<SubscribeRequest>>,
    ) -> std::result::Result<Response<Self::SubscribeStream>, Status> {
        Ok(Response::new(self.start_subscription(request.into_inner())))
    }
}
