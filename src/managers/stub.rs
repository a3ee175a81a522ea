/*!
 * Proxy Stubs
 *
 * [`ProxyStub`] is the RPC handle for one hosted object: manager address,
 * object id and kind. Every calling thread gets its own channel to the
 * manager, opened on first use, so each client thread maps to one server
 * thread. Typed stubs on top implement the same delegate traits as the local
 * primitives, which lets the ordinary capability traits drive them.
 *
 * Errors raised by the hosted primitive come back as `BridgeError::Delegate`;
 * a broken or refused channel is `BridgeError::Transport`.
 */

use super::protocol::{ObjectId, PrimitiveKind, Request, Response, Value};
use crate::capability::{Capability, ACQUIRER_PROXY, CONDITION_PROXY, QUEUE_PROXY, WAITER_PROXY};
use crate::core::backoff::deadline_after;
use crate::core::codec;
use crate::core::config::BridgeConfig;
use crate::core::errors::{BridgeError, BridgeResult, TransportError};
use crate::monitoring::CallSpan;
use crate::sync::traits::{Acquire, ConditionVar, JoinableQueueOps, QueueOps, Wait};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// CHANNEL
// =============================================================================

/// One TCP connection to a manager
pub(crate) struct Channel {
    stream: TcpStream,
    max_frame_len: usize,
}

impl Channel {
    pub(crate) fn open(address: SocketAddr) -> BridgeResult<Self> {
        let config = BridgeConfig::global();
        let connect_error = |e: std::io::Error| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        };
        let stream =
            TcpStream::connect_timeout(&address, config.connect_timeout).map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;

        Ok(Self {
            stream,
            max_frame_len: config.max_frame_len,
        })
    }

    pub(crate) fn request(&mut self, request: &Request) -> BridgeResult<Response> {
        codec::send_value(&mut self.stream, request, self.max_frame_len)?;
        Ok(codec::recv_value(&mut self.stream, self.max_frame_len)?)
    }
}

// =============================================================================
// PROXY STUB
// =============================================================================

thread_local! {
    /// Dropped at thread exit, which marks that thread's channels stale
    static THREAD_ALIVE: Arc<()> = Arc::new(());
}

/// A calling thread's channel and that thread's liveness marker
struct ThreadChannel {
    channel: Arc<Mutex<Channel>>,
    alive: Weak<()>,
}

/// RPC handle for one hosted object
///
/// Serializes as `(address, id, kind)`; a deserialized stub reconnects on its
/// first call. Channels of exited threads are closed when another thread
/// opens one, which also ends their server-side threads.
#[derive(Serialize, Deserialize)]
pub struct ProxyStub {
    address: SocketAddr,
    id: ObjectId,
    kind: PrimitiveKind,
    #[serde(skip)]
    channels: DashMap<ThreadId, ThreadChannel>,
}

impl ProxyStub {
    pub fn new(address: SocketAddr, id: ObjectId, kind: PrimitiveKind) -> Self {
        Self {
            address,
            id,
            kind,
            channels: DashMap::new(),
        }
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    /// Call `method` on the hosted object and wait for its result
    pub fn call_method(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> BridgeResult<Value> {
        let mut span = CallSpan::new(self.kind.as_str(), self.id, method);
        let result = self
            .request(Request::Call {
                id: self.id,
                method: method.to_string(),
                args,
                kwargs,
            })
            .and_then(Response::into_value);
        if let Err(e) = &result {
            span.record_error(e);
        }
        result
    }

    /// Remove the hosted object from the manager
    ///
    /// Every other stub for the same object fails with `NotFound` afterwards.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.request(Request::Dispose { id: self.id })?.into_ack()
    }

    fn request(&self, request: Request) -> BridgeResult<Response> {
        let channel = self.channel()?;
        let result = channel.lock().request(&request);
        if let Err(e) = &result {
            if e.is_transport() {
                // Reconnect on the next call
                self.channels.remove(&thread::current().id());
            }
        }
        result
    }

    /// This thread's channel, opened on first use
    fn channel(&self) -> BridgeResult<Arc<Mutex<Channel>>> {
        let thread = thread::current().id();
        if let Some(entry) = self.channels.get(&thread) {
            return Ok(Arc::clone(&entry.channel));
        }

        self.prune_exited();
        let channel = Arc::new(Mutex::new(Channel::open(self.address)?));
        debug!(id = self.id, kind = %self.kind, address = %self.address, "Opened manager channel");
        self.channels.insert(
            thread,
            ThreadChannel {
                channel: Arc::clone(&channel),
                alive: THREAD_ALIVE.try_with(Arc::downgrade).unwrap_or_default(),
            },
        );
        Ok(channel)
    }

    /// Drop the channels of threads that have exited
    fn prune_exited(&self) {
        let before = self.channels.len();
        self.channels.retain(|_, entry| entry.alive.strong_count() > 0);
        let pruned = before.saturating_sub(self.channels.len());
        if pruned > 0 {
            debug!(id = self.id, pruned, "Closed channels of exited threads");
        }
    }

    /// Channels currently open, one per calling thread
    pub fn open_channels(&self) -> usize {
        self.channels.len()
    }

    fn call(&self, method: &str, args: Vec<Value>) -> BridgeResult<Value> {
        self.call_method(method, args, Vec::new())
    }

    fn call_unit(&self, method: &str, args: Vec<Value>) -> BridgeResult<()> {
        self.call(method, args).map(|_| ())
    }

    fn call_bool(&self, method: &str, args: Vec<Value>) -> BridgeResult<bool> {
        let value = self.call(method, args)?;
        value.as_bool().ok_or_else(|| unexpected(method, "bool", &value))
    }

    fn call_usize(&self, method: &str, args: Vec<Value>) -> BridgeResult<usize> {
        let value = self.call(method, args)?;
        value.as_usize().ok_or_else(|| unexpected(method, "int", &value))
    }

    fn call_bytes(&self, method: &str, args: Vec<Value>) -> BridgeResult<Vec<u8>> {
        match self.call(method, args)? {
            Value::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(method, "bytes", &other)),
        }
    }
}

impl Clone for ProxyStub {
    /// Same object, no channels
    fn clone(&self) -> Self {
        Self::new(self.address, self.id, self.kind)
    }
}

impl fmt::Debug for ProxyStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyStub")
            .field("address", &self.address)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("channels", &self.open_channels())
            .finish()
    }
}

fn unexpected(method: &str, expected: &str, got: &Value) -> BridgeError {
    let message = format!("'{}' returned {}, expected {}", method, got.type_name(), expected);
    TransportError::Protocol(message).into()
}

// =============================================================================
// TYPED STUBS
// =============================================================================

/// A typed view over a [`ProxyStub`]
pub trait Stub: Send + Sync + Sized + 'static {
    const CAPABILITY: &'static Capability;

    /// Whether a stub of this type can front an object of `kind`
    fn accepts(kind: PrimitiveKind) -> bool;

    fn from_stub(stub: ProxyStub) -> Self;

    fn stub(&self) -> &ProxyStub;
}

macro_rules! stub_type {
    ($name:ident, $capability:expr, $($kind:ident)|+) => {
        impl Stub for $name {
            const CAPABILITY: &'static Capability = &$capability;

            fn accepts(kind: PrimitiveKind) -> bool {
                matches!(kind, $(PrimitiveKind::$kind)|+)
            }

            fn from_stub(stub: ProxyStub) -> Self {
                Self { stub }
            }

            fn stub(&self) -> &ProxyStub {
                &self.stub
            }
        }
    };
}

/// Remote queue of `T`; items cross the channel bincode-encoded
pub struct QueueStub<T> {
    stub: ProxyStub,
    _item: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned + Send + 'static> QueueStub<T> {
    pub fn empty(&self) -> BridgeResult<bool> {
        self.stub.call_bool("empty", Vec::new())
    }

    pub fn full(&self) -> BridgeResult<bool> {
        self.stub.call_bool("full", Vec::new())
    }
}

impl<T: Send + 'static> Stub for QueueStub<T> {
    const CAPABILITY: &'static Capability = &QUEUE_PROXY;

    fn accepts(kind: PrimitiveKind) -> bool {
        matches!(kind, PrimitiveKind::Queue | PrimitiveKind::JoinableQueue)
    }

    fn from_stub(stub: ProxyStub) -> Self {
        Self {
            stub,
            _item: PhantomData,
        }
    }

    fn stub(&self) -> &ProxyStub {
        &self.stub
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> QueueOps<T> for QueueStub<T> {
    fn put(&self, item: T, block: bool, timeout: Option<Duration>) -> BridgeResult<()> {
        let item = codec::encode(&item)?;
        self.stub
            .call_unit("put", vec![item.into(), block.into(), Value::timeout(timeout)])
    }

    fn get(&self, block: bool, timeout: Option<Duration>) -> BridgeResult<T> {
        let bytes = self
            .stub
            .call_bytes("get", vec![block.into(), Value::timeout(timeout)])?;
        Ok(codec::decode(&bytes)?)
    }

    fn qsize(&self) -> BridgeResult<usize> {
        self.stub.call_usize("qsize", Vec::new())
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> JoinableQueueOps<T> for QueueStub<T> {
    fn task_done(&self) -> BridgeResult<()> {
        self.stub.call_unit("task_done", Vec::new())
    }

    fn join(&self) -> BridgeResult<()> {
        self.stub.call_unit("join", Vec::new())
    }
}

/// Remote lock, recursive lock or semaphore
pub struct AcquirerStub {
    stub: ProxyStub,
}

stub_type!(AcquirerStub, ACQUIRER_PROXY, Lock | RLock | Semaphore | BoundedSemaphore);

impl AcquirerStub {
    /// Current value of a remote semaphore
    pub fn get_value(&self) -> BridgeResult<usize> {
        self.stub.call_usize("get_value", Vec::new())
    }

    /// Whether a remote plain lock is held
    pub fn locked(&self) -> BridgeResult<bool> {
        self.stub.call_bool("locked", Vec::new())
    }
}

impl Acquire for AcquirerStub {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        remote_acquire(&self.stub, blocking, timeout)
    }

    fn release(&self) -> BridgeResult<()> {
        self.stub.call_unit("release", Vec::new())
    }
}

fn remote_acquire(
    stub: &ProxyStub,
    blocking: bool,
    timeout: Option<Duration>,
) -> BridgeResult<bool> {
    stub.call_bool("acquire", vec![blocking.into(), Value::timeout(timeout)])
}

pub struct ConditionStub {
    stub: ProxyStub,
}

stub_type!(ConditionStub, CONDITION_PROXY, Condition);

impl Acquire for ConditionStub {
    fn acquire(&self, blocking: bool, timeout: Option<Duration>) -> BridgeResult<bool> {
        remote_acquire(&self.stub, blocking, timeout)
    }

    fn release(&self) -> BridgeResult<()> {
        self.stub.call_unit("release", Vec::new())
    }
}

impl ConditionVar for ConditionStub {
    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.stub.call_bool("wait", vec![Value::timeout(timeout)])
    }

    /// The predicate runs here, between remote waits
    fn wait_for<P>(&self, mut predicate: P, timeout: Option<Duration>) -> BridgeResult<bool>
    where
        P: FnMut() -> bool,
    {
        let deadline = deadline_after(timeout);
        let mut result = predicate();
        while !result {
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(left) if !left.is_zero() => Some(left),
                    _ => break,
                },
                None => None,
            };
            self.wait(remaining)?;
            result = predicate();
        }
        Ok(result)
    }

    fn notify(&self, n: usize) -> BridgeResult<()> {
        self.stub.call_unit("notify", vec![n.into()])
    }

    fn notify_all(&self) -> BridgeResult<()> {
        self.stub.call_unit("notify_all", Vec::new())
    }
}

pub struct EventStub {
    stub: ProxyStub,
}

stub_type!(EventStub, WAITER_PROXY, Event);

impl EventStub {
    pub fn set(&self) -> BridgeResult<()> {
        self.stub.call_unit("set", Vec::new())
    }

    pub fn clear(&self) -> BridgeResult<()> {
        self.stub.call_unit("clear", Vec::new())
    }

    pub fn is_set(&self) -> BridgeResult<bool> {
        self.stub.call_bool("is_set", Vec::new())
    }
}

impl Wait for EventStub {
    type Output = bool;

    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<bool> {
        self.stub.call_bool("wait", vec![Value::timeout(timeout)])
    }
}

pub struct BarrierStub {
    stub: ProxyStub,
}

stub_type!(BarrierStub, WAITER_PROXY, Barrier);

impl BarrierStub {
    pub fn abort(&self) -> BridgeResult<()> {
        self.stub.call_unit("abort", Vec::new())
    }

    pub fn reset(&self) -> BridgeResult<()> {
        self.stub.call_unit("reset", Vec::new())
    }

    pub fn parties(&self) -> BridgeResult<usize> {
        self.stub.call_usize("parties", Vec::new())
    }

    pub fn n_waiting(&self) -> BridgeResult<usize> {
        self.stub.call_usize("n_waiting", Vec::new())
    }

    pub fn broken(&self) -> BridgeResult<bool> {
        self.stub.call_bool("broken", Vec::new())
    }
}

impl Wait for BarrierStub {
    /// Arrival index within the cohort
    type Output = usize;

    fn wait(&self, timeout: Option<Duration>) -> BridgeResult<usize> {
        self.stub.call_usize("wait", vec![Value::timeout(timeout)])
    }
}
