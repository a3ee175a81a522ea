/*!
 * Manager Server
 *
 * Hosts shared primitives in a registry and serves method calls on them.
 *
 * # Threading
 *
 * One OS thread per client channel. Every call arriving on a channel runs on
 * that channel's thread, so a recursive lock or condition acquired over a
 * channel is released by the thread that owns it. Clients open one channel
 * per calling thread (see `ProxyStub`).
 */

use super::protocol::{ObjectId, PrimitiveKind, Request, Response, Value};
use crate::core::codec;
use crate::core::config::BridgeConfig;
use crate::core::errors::{BridgeError, BridgeResult, DelegateError, TransportError};
use crate::core::limits::MANAGER_THREAD_PREFIX;
use crate::queue::JoinableQueue;
use crate::sync::traits::{Acquire, ConditionVar, JoinableQueueOps, QueueOps, Wait};
use crate::sync::{Barrier, BoundedSemaphore, Condition, Event, Lock, RLock, Semaphore};
use dashmap::DashMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// HOSTED OBJECTS
// =============================================================================

enum Hosted {
    /// Both queue kinds; plain queues refuse `task_done`/`join`
    Queue(JoinableQueue<Vec<u8>>),
    Lock(Lock),
    RLock(RLock),
    Semaphore(Semaphore),
    BoundedSemaphore(BoundedSemaphore),
    Condition(Condition),
    Event(Event),
    Barrier(Barrier),
}

struct HostedObject {
    kind: PrimitiveKind,
    object: Hosted,
}

impl HostedObject {
    fn create(kind: PrimitiveKind, args: Vec<Value>) -> BridgeResult<Self> {
        let mut args = CallArgs::new(args, Vec::new());
        let object = match kind {
            PrimitiveKind::Queue | PrimitiveKind::JoinableQueue => {
                Hosted::Queue(JoinableQueue::new(args.optional_usize(0, "maxsize")?))
            }
            PrimitiveKind::Lock => Hosted::Lock(Lock::new()),
            PrimitiveKind::RLock => Hosted::RLock(RLock::new()),
            PrimitiveKind::Semaphore => {
                Hosted::Semaphore(Semaphore::new(args.usize_or(0, "value", 1)?))
            }
            PrimitiveKind::BoundedSemaphore => {
                Hosted::BoundedSemaphore(BoundedSemaphore::new(args.usize_or(0, "value", 1)?))
            }
            PrimitiveKind::Condition => Hosted::Condition(Condition::new()),
            PrimitiveKind::Event => Hosted::Event(Event::new()),
            PrimitiveKind::Barrier => {
                let parties = args.optional_usize(0, "parties")?.ok_or_else(|| {
                    DelegateError::InvalidArgument("barrier needs 'parties'".into())
                })?;
                let barrier = match args.timeout(1, "timeout")? {
                    Some(timeout) => Barrier::with_timeout(parties, timeout)?,
                    None => Barrier::new(parties)?,
                };
                Hosted::Barrier(barrier)
            }
        };
        Ok(Self { kind, object })
    }

    fn call(&self, method: &str, mut args: CallArgs) -> BridgeResult<Value> {
        let handled: Option<Value> = match &self.object {
            Hosted::Queue(queue) => self.call_queue(queue, method, &mut args)?,
            Hosted::Lock(lock) => match method {
                "locked" => Some(lock.locked().into()),
                _ => call_acquirer(lock, method, &mut args)?,
            },
            Hosted::RLock(lock) => call_acquirer(lock, method, &mut args)?,
            Hosted::Semaphore(sem) => match method {
                "get_value" => Some(sem.get_value().into()),
                _ => call_acquirer(sem, method, &mut args)?,
            },
            Hosted::BoundedSemaphore(sem) => match method {
                "get_value" => Some(sem.get_value().into()),
                _ => call_acquirer(sem, method, &mut args)?,
            },
            Hosted::Condition(cond) => call_condition(cond, method, &mut args)?,
            Hosted::Event(event) => match method {
                "set" => Some(event.set().into()),
                "clear" => Some(event.clear().into()),
                "is_set" => Some(event.is_set().into()),
                "wait" => Some(event.wait(args.timeout(0, "timeout")?)?.into()),
                _ => None,
            },
            Hosted::Barrier(barrier) => match method {
                "wait" => Some(barrier.wait(args.timeout(0, "timeout")?)?.into()),
                "abort" => Some(barrier.abort().into()),
                "reset" => Some(barrier.reset().into()),
                "parties" => Some(barrier.parties().into()),
                "n_waiting" => Some(barrier.n_waiting().into()),
                "broken" => Some(barrier.broken().into()),
                _ => None,
            },
        };

        handled.ok_or_else(|| {
            DelegateError::NoSuchMethod {
                kind: self.kind.to_string(),
                method: method.to_string(),
            }
            .into()
        })
    }

    fn call_queue(
        &self,
        queue: &JoinableQueue<Vec<u8>>,
        method: &str,
        args: &mut CallArgs,
    ) -> BridgeResult<Option<Value>> {
        let value: Value = match method {
            "put" => {
                let item = args.bytes(0, "item")?;
                let block = args.bool_or(1, "block", true)?;
                queue.put(item, block, args.timeout(2, "timeout")?)?.into()
            }
            "put_nowait" => queue.put_nowait(args.bytes(0, "item")?)?.into(),
            "get" => {
                let block = args.bool_or(0, "block", true)?;
                queue.get(block, args.timeout(1, "timeout")?)?.into()
            }
            "get_nowait" => queue.get_nowait()?.into(),
            "qsize" => queue.qsize()?.into(),
            "empty" => queue.empty().into(),
            "full" => queue.full().into(),
            "task_done" if self.kind == PrimitiveKind::JoinableQueue => queue.task_done()?.into(),
            "join" if self.kind == PrimitiveKind::JoinableQueue => queue.join()?.into(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

fn call_acquirer<A: Acquire>(
    lock: &A,
    method: &str,
    args: &mut CallArgs,
) -> BridgeResult<Option<Value>> {
    let value: Value = match method {
        "acquire" => {
            let blocking = args.bool_or(0, "blocking", true)?;
            lock.acquire(blocking, args.timeout(1, "timeout")?)?.into()
        }
        "release" => lock.release()?.into(),
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn call_condition(
    cond: &Condition,
    method: &str,
    args: &mut CallArgs,
) -> BridgeResult<Option<Value>> {
    let value: Value = match method {
        "wait" => cond.wait(args.timeout(0, "timeout")?)?.into(),
        "notify" => cond.notify(args.usize_or(0, "n", 1)?)?.into(),
        "notify_all" => cond.notify_all()?.into(),
        _ => return call_acquirer(cond, method, args),
    };
    Ok(Some(value))
}

/// Positional and keyword arguments of one call
///
/// A keyword wins over the positional argument at the same slot.
struct CallArgs {
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
}

impl CallArgs {
    fn new(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Self {
        Self { args, kwargs }
    }

    fn take(&mut self, pos: usize, name: &str) -> Option<Value> {
        if let Some(index) = self.kwargs.iter().position(|(key, _)| key == name) {
            return Some(self.kwargs.swap_remove(index).1);
        }
        self.args
            .get_mut(pos)
            .map(|slot| std::mem::replace(slot, Value::None))
    }

    fn bool_or(&mut self, pos: usize, name: &str, default: bool) -> BridgeResult<bool> {
        match self.take(pos, name) {
            None | Some(Value::None) => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| invalid(name, "bool", &value)),
        }
    }

    fn optional_usize(&mut self, pos: usize, name: &str) -> BridgeResult<Option<usize>> {
        match self.take(pos, name) {
            None | Some(Value::None) => Ok(None),
            Some(value) => value.as_usize().map(Some).ok_or_else(|| invalid(name, "int", &value)),
        }
    }

    fn usize_or(&mut self, pos: usize, name: &str, default: usize) -> BridgeResult<usize> {
        Ok(self.optional_usize(pos, name)?.unwrap_or(default))
    }

    fn timeout(&mut self, pos: usize, name: &str) -> BridgeResult<Option<Duration>> {
        match self.take(pos, name) {
            None => Ok(None),
            Some(value) => value.as_timeout().ok_or_else(|| invalid(name, "timeout", &value)),
        }
    }

    fn bytes(&mut self, pos: usize, name: &str) -> BridgeResult<Vec<u8>> {
        match self.take(pos, name) {
            Some(Value::Bytes(bytes)) => Ok(bytes),
            Some(value) => Err(invalid(name, "bytes", &value)),
            None => {
                Err(DelegateError::InvalidArgument(format!("missing argument '{}'", name)).into())
            }
        }
    }
}

fn invalid(name: &str, expected: &str, got: &Value) -> BridgeError {
    let message = format!("'{}' must be {}, got {}", name, expected, got.type_name());
    DelegateError::InvalidArgument(message).into()
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Hosted objects by id
pub(crate) struct Registry {
    objects: DashMap<ObjectId, Arc<HostedObject>>,
    next_id: AtomicU64,
}

impl Registry {
    fn new() -> Self {
        Self {
            objects: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn len(&self) -> usize {
        self.objects.len()
    }

    fn handle(&self, request: Request) -> Response {
        match request {
            Request::Create { kind, args } => match HostedObject::create(kind, args) {
                Ok(object) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    self.objects.insert(id, Arc::new(object));
                    debug!(id, %kind, "Hosted new object");
                    Response::Created(id)
                }
                Err(e) => Response::Error(into_delegate(e)),
            },
            Request::Call { id, method, args, kwargs } => {
                // Clone out of the map: calls may block for a long time
                let object = match self.objects.get(&id) {
                    Some(entry) => Arc::clone(entry.value()),
                    None => return Response::Error(DelegateError::NotFound(id)),
                };
                match object.call(&method, CallArgs::new(args, kwargs)) {
                    Ok(value) => Response::Value(value),
                    Err(e) => Response::Error(into_delegate(e)),
                }
            }
            Request::Dispose { id } => match self.objects.remove(&id) {
                Some(_) => {
                    debug!(id, "Disposed object");
                    Response::Ack
                }
                None => Response::Error(DelegateError::NotFound(id)),
            },
            Request::Ping | Request::Shutdown => Response::Ack,
        }
    }
}

/// Hosted primitives only raise delegate errors; anything else is reported as one
fn into_delegate(err: BridgeError) -> DelegateError {
    match err {
        BridgeError::Delegate(err) => err,
        other => DelegateError::InvalidOperation(other.to_string()),
    }
}

// =============================================================================
// SERVER
// =============================================================================

pub struct ManagerServer {
    listener: TcpListener,
    address: SocketAddr,
    registry: Arc<Registry>,
    stopping: Arc<AtomicBool>,
}

impl ManagerServer {
    /// Bind the listening socket; port 0 picks a free one
    pub fn bind(address: SocketAddr) -> BridgeResult<Self> {
        let listener = TcpListener::bind(address).map_err(|e| TransportError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        let address = listener.local_addr()?;

        Ok(Self {
            listener,
            address,
            registry: Arc::new(Registry::new()),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The bound address, with the real port
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Number of hosted objects
    pub fn objects(&self) -> usize {
        self.registry.len()
    }

    /// Accept channels until a client requests shutdown
    ///
    /// Channel threads still serving blocked calls are left to finish on
    /// their own.
    pub fn serve_forever(self) -> BridgeResult<()> {
        info!(address = %self.address, "Manager serving");
        let mut next_channel = 0u64;

        for incoming in self.listener.incoming() {
            if self.stopping.load(Ordering::Acquire) {
                break;
            }
            let stream = match incoming {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Failed to accept manager channel");
                    continue;
                }
            };

            next_channel += 1;
            let registry = Arc::clone(&self.registry);
            let stopping = Arc::clone(&self.stopping);
            let address = self.address;
            let spawned = thread::Builder::new()
                .name(format!("{}-channel-{}", MANAGER_THREAD_PREFIX, next_channel))
                .spawn(move || serve_channel(stream, &registry, &stopping, address));
            if let Err(e) = spawned {
                warn!(error = %e, "Failed to start channel thread");
            }
        }

        info!(objects = self.registry.len(), "Manager stopped");
        Ok(())
    }
}

impl fmt::Debug for ManagerServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerServer")
            .field("address", &self.address)
            .field("objects", &self.registry.len())
            .finish()
    }
}

fn serve_channel(
    mut stream: TcpStream,
    registry: &Registry,
    stopping: &AtomicBool,
    address: SocketAddr,
) {
    let max_frame_len = BridgeConfig::global().max_frame_len;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Could not disable Nagle on manager channel");
    }

    loop {
        let request: Request = match codec::recv_value(&mut stream, max_frame_len) {
            Ok(request) => request,
            Err(TransportError::Closed) => {
                debug!("Manager channel closed by client");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping manager channel");
                return;
            }
        };

        let shutting_down = matches!(request, Request::Shutdown);
        let response = registry.handle(request);
        if let Err(e) = codec::send_value(&mut stream, &response, max_frame_len) {
            warn!(error = %e, "Failed to answer on manager channel");
            return;
        }

        if shutting_down {
            info!("Manager shutdown requested");
            stopping.store(true, Ordering::Release);
            wake_acceptor(address);
            return;
        }
    }
}

/// Unblock the accept loop so it sees the stop flag
fn wake_acceptor(mut address: SocketAddr) {
    if address.ip().is_unspecified() {
        address.set_ip(Ipv4Addr::LOCALHOST.into());
    }
    if let Err(e) = TcpStream::connect_timeout(&address, BridgeConfig::global().connect_timeout) {
        warn!(error = %e, "Could not wake manager accept loop");
    }
}
