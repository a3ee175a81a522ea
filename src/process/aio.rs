/*!
 * Process Bridge
 * `AioProcess` offloads `join` through [`AsyncJoin`]
 */

use super::child::{ChildProcess, ProcessSpec};
use crate::capability::{AsyncJoin, Bridge, Capability, PROCESS};
use crate::context::{Context, FromContext};
use crate::core::errors::BridgeResult;
use crate::executor::{Executor, Transfer};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

pub struct AioProcess {
    delegate: Arc<ChildProcess>,
    executor: Executor,
}

impl AioProcess {
    pub fn from_delegate(delegate: ChildProcess) -> Self {
        Self::from_arc(Arc::new(delegate))
    }

    pub fn from_arc(delegate: Arc<ChildProcess>) -> Self {
        Self {
            delegate,
            executor: Executor::for_capability(&PROCESS),
        }
    }

    pub fn with_context(ctx: &Context, spec: ProcessSpec) -> BridgeResult<Self> {
        Ok(Self::from_delegate(ChildProcess::from_context(ctx, spec)?))
    }

    pub fn new(spec: ProcessSpec) -> BridgeResult<Self> {
        Self::with_context(&Context::default(), spec)
    }
}

impl Bridge for AioProcess {
    type Delegate = ChildProcess;

    const CAPABILITY: &'static Capability = &PROCESS;

    fn delegate(&self) -> &Arc<ChildProcess> {
        &self.delegate
    }

    fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl AsyncJoin for AioProcess {}

impl Deref for AioProcess {
    type Target = ChildProcess;

    fn deref(&self) -> &ChildProcess {
        &self.delegate
    }
}

impl Clone for AioProcess {
    fn clone(&self) -> Self {
        Self::from_arc(Arc::clone(&self.delegate))
    }
}

impl Transfer for AioProcess {
    fn prepare_for_transfer(&self) {
        self.executor.prepare_for_transfer();
    }

    fn resume_after_transfer(&self) {
        self.executor.resume_after_transfer();
    }
}

impl fmt::Debug for AioProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AioProcess").field(&self.delegate).finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_async_join() {
        let spec = ProcessSpec::new("sh").args(["-c", "sleep 0.05; exit 7"]);
        let process = AioProcess::new(spec).unwrap();
        process.start().unwrap();

        assert_eq!(process.async_join(Some(Duration::from_millis(1))).await, Ok(false));
        assert_eq!(process.async_join(Some(Duration::from_secs(5))).await, Ok(true));
        assert_eq!(process.exitcode(), Ok(Some(7)));
    }

    #[tokio::test]
    async fn test_async_join_unstarted_fails() {
        let process = AioProcess::new(ProcessSpec::new("true")).unwrap();
        assert!(process.async_join(None).await.is_err());
    }
}
