/*!
 * Async Proxies
 *
 * `Proxy<S>` offloads every call on a typed stub, through the same
 * capability traits the local wrappers use. No lock state is tracked here:
 * the manager owns the real primitive.
 */

use super::protocol::Value;
use super::stub::{
    AcquirerStub, BarrierStub, ConditionStub, EventStub, ProxyStub, QueueStub, Stub,
};
use crate::capability::{
    AsyncAcquire, AsyncCondition, AsyncJoinableQueue, AsyncQueue, AsyncWait, Bridge, Capability,
};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

pub type QueueProxy<T> = Proxy<QueueStub<T>>;
pub type AcquirerProxy = Proxy<AcquirerStub>;
pub type ConditionProxy = Proxy<ConditionStub>;
pub type EventProxy = Proxy<EventStub>;
pub type BarrierProxy = Proxy<BarrierStub>;

pub struct Proxy<S: Stub> {
    stub: Arc<S>,
    executor: Executor,
}

impl<S: Stub> Proxy<S> {
    pub fn from_stub(stub: S) -> Self {
        Self {
            stub: Arc::new(stub),
            executor: Executor::for_capability(S::CAPABILITY),
        }
    }

    /// The untyped RPC handle underneath
    pub fn proxy_stub(&self) -> &ProxyStub {
        self.stub.stub()
    }

    /// Call any method of the hosted object on a worker thread
    pub fn async_call_method(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> impl Future<Output = BridgeResult<Value>> + Send {
        let method = method.to_string();
        let handle = self.offload(move |s| s.stub().call_method(&method, args, kwargs));
        async move { handle.await? }
    }

    /// Remove the object from the manager
    pub fn dispose(&self) -> BridgeResult<()> {
        self.stub.stub().dispose()
    }
}

impl<S: Stub> Bridge for Proxy<S> {
    type Delegate = S;

    const CAPABILITY: &'static Capability = S::CAPABILITY;

    fn delegate(&self) -> &Arc<S> {
        &self.stub
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl<T: Serialize + DeserializeOwned + Send + 'static> AsyncQueue<T> for QueueProxy<T> {}

impl<T: Serialize + DeserializeOwned + Send + 'static> AsyncJoinableQueue<T> for QueueProxy<T> {}

impl AsyncAcquire for AcquirerProxy {}

impl AsyncAcquire for ConditionProxy {}

impl AsyncCondition for ConditionProxy {}

impl AsyncWait for EventProxy {}

impl AsyncWait for BarrierProxy {}

impl<S: Stub> Deref for Proxy<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.stub
    }
}

impl<S: Stub> Clone for Proxy<S> {
    /// Same hosted object over fresh channels
    fn clone(&self) -> Self {
        Self {
            stub: Arc::new(S::from_stub(self.stub.stub().clone())),
            executor: self.executor.clone(),
        }
    }
}

impl<S: Stub> Transfer for Proxy<S> {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}

impl<S: Stub> Serialize for Proxy<S> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.stub.stub().serialize(serializer)
    }
}

impl<'de, S: Stub> Deserialize<'de> for Proxy<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let stub = ProxyStub::deserialize(deserializer)?;
        if !S::accepts(stub.kind()) {
            return Err(de::Error::custom(format!(
                "a {} proxy cannot front a {} object",
                S::CAPABILITY.name,
                stub.kind()
            )));
        }
        Ok(Self::from_stub(S::from_stub(stub)))
    }
}

impl<S: Stub> fmt::Debug for Proxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("capability", &S::CAPABILITY.name)
            .field("stub", self.stub.stub())
            .field("executor", &self.executor)
            .finish()
    }
}
