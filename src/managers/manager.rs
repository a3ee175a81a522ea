/*!
 * Manager Handle
 *
 * Starts an in-process manager or connects to one running in another process,
 * and creates hosted primitives on it.
 */

use super::protocol::{PrimitiveKind, Request, Response, Value};
use super::proxy::{AcquirerProxy, BarrierProxy, ConditionProxy, EventProxy, Proxy, QueueProxy};
use super::server::ManagerServer;
use super::stub::{Channel, ProxyStub, Stub};
use crate::core::backoff::poll_until;
use crate::core::config::BridgeConfig;
use crate::core::errors::{BridgeError, BridgeResult};
use crate::core::limits::MANAGER_THREAD_PREFIX;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Manager {
    address: SocketAddr,
    /// Control channel for create/ping/shutdown, opened lazily
    control: Mutex<Option<Channel>>,
    /// Server thread, for a manager started by this process
    server: Mutex<Option<JoinHandle<BridgeResult<()>>>>,
    shut_down: AtomicBool,
}

impl Manager {
    /// Start a manager on a background thread, bound to `BridgeConfig::manager_bind`
    pub fn start() -> BridgeResult<Self> {
        Self::start_at(BridgeConfig::global().manager_bind)
    }

    pub fn start_at(bind: SocketAddr) -> BridgeResult<Self> {
        let server = ManagerServer::bind(bind)?;
        let address = server.address();
        let handle = thread::Builder::new()
            .name(MANAGER_THREAD_PREFIX.to_string())
            .spawn(move || server.serve_forever())
            .map_err(|e| BridgeError::WorkerSpawn(e.to_string()))?;

        info!(%address, "Manager started");
        Ok(Self {
            address,
            control: Mutex::new(None),
            server: Mutex::new(Some(handle)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Attach to a manager running elsewhere
    pub fn connect(address: SocketAddr) -> BridgeResult<Self> {
        let manager = Self {
            address,
            control: Mutex::new(None),
            server: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        };
        manager.ping()?;
        debug!(%address, "Connected to manager");
        Ok(manager)
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Whether the server runs inside this process
    pub fn is_local(&self) -> bool {
        self.server.lock().is_some()
    }

    pub fn ping(&self) -> BridgeResult<()> {
        self.request(Request::Ping)?.into_ack()
    }

    /// Ask the manager to stop accepting channels
    pub fn shutdown(&self) -> BridgeResult<()> {
        self.request(Request::Shutdown)?.into_ack()?;
        self.shut_down.store(true, Ordering::Release);
        *self.control.lock() = None;
        info!(address = %self.address, "Manager shutdown sent");
        Ok(())
    }

    /// Wait for the manager to stop; `Ok(false)` if `timeout` elapsed first
    ///
    /// A remote manager counts as stopped once it no longer accepts channels.
    pub fn join(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        if !self.is_local() {
            let stopped = poll_until(timeout, || -> BridgeResult<Option<()>> {
                Ok(Channel::open(self.address).is_err().then_some(()))
            })?;
            return Ok(stopped.is_some());
        }

        let finished = poll_until(timeout, || -> BridgeResult<Option<()>> {
            let server = self.server.lock();
            Ok(server.as_ref().map_or(true, |h| h.is_finished()).then_some(()))
        })?;
        if finished.is_none() {
            return Ok(false);
        }

        let handle = self.server.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| BridgeError::Panicked("manager server thread panicked".into()))??;
        }
        Ok(true)
    }

    // =========================================================================
    // FACTORIES
    // =========================================================================

    pub fn queue<T>(&self, maxsize: Option<usize>) -> BridgeResult<QueueProxy<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.create(PrimitiveKind::Queue, vec![maxsize_arg(maxsize)])
    }

    pub fn joinable_queue<T>(&self, maxsize: Option<usize>) -> BridgeResult<QueueProxy<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.create(PrimitiveKind::JoinableQueue, vec![maxsize_arg(maxsize)])
    }

    pub fn lock(&self) -> BridgeResult<AcquirerProxy> {
        self.create(PrimitiveKind::Lock, Vec::new())
    }

    pub fn rlock(&self) -> BridgeResult<AcquirerProxy> {
        self.create(PrimitiveKind::RLock, Vec::new())
    }

    pub fn semaphore(&self, value: usize) -> BridgeResult<AcquirerProxy> {
        self.create(PrimitiveKind::Semaphore, vec![value.into()])
    }

    pub fn bounded_semaphore(&self, value: usize) -> BridgeResult<AcquirerProxy> {
        self.create(PrimitiveKind::BoundedSemaphore, vec![value.into()])
    }

    pub fn condition(&self) -> BridgeResult<ConditionProxy> {
        self.create(PrimitiveKind::Condition, Vec::new())
    }

    pub fn event(&self) -> BridgeResult<EventProxy> {
        self.create(PrimitiveKind::Event, Vec::new())
    }

    /// Barrier for `parties`; waits without their own timeout use `timeout`
    pub fn barrier(&self, parties: usize, timeout: Option<Duration>) -> BridgeResult<BarrierProxy> {
        self.create(PrimitiveKind::Barrier, vec![parties.into(), Value::timeout(timeout)])
    }

    fn create<S: Stub>(&self, kind: PrimitiveKind, args: Vec<Value>) -> BridgeResult<Proxy<S>> {
        let id = self.request(Request::Create { kind, args })?.into_created()?;
        Ok(Proxy::from_stub(S::from_stub(ProxyStub::new(self.address, id, kind))))
    }

    fn request(&self, request: Request) -> BridgeResult<Response> {
        let mut control = self.control.lock();
        let mut channel = match control.take() {
            Some(channel) => channel,
            None => Channel::open(self.address)?,
        };
        let result = channel.request(&request);
        // A broken channel is dropped and reopened on the next request
        if !matches!(&result, Err(e) if e.is_transport()) {
            *control = Some(channel);
        }
        result
    }
}

fn maxsize_arg(maxsize: Option<usize>) -> Value {
    maxsize.map_or(Value::None, Value::from)
}

impl Drop for Manager {
    /// A manager started here stops with its handle
    fn drop(&mut self) {
        if self.server.get_mut().is_some() && !self.shut_down.load(Ordering::Acquire) {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "Failed to stop manager on drop");
            }
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("address", &self.address)
            .field("local", &self.is_local())
            .finish()
    }
}
