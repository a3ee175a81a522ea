/*!
 * Queue Delegates
 * FIFO queues over flume channels
 */

use crate::core::backoff::deadline_after;
use crate::core::errors::{BridgeResult, DelegateError};
use crate::sync::traits::{JoinableQueueOps, QueueOps};
use crate::sync::wait_while;
use flume::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// FIFO queue, bounded or unbounded
///
/// `maxsize` of `None` or `Some(0)` means unbounded.
pub struct Queue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
    maxsize: Option<usize>,
    join_cancelled: AtomicBool,
}

impl<T: Send + 'static> Queue<T> {
    pub fn new(maxsize: Option<usize>) -> Self {
        let maxsize = maxsize.filter(|&m| m > 0);
        let (sender, receiver) = match maxsize {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            maxsize,
            join_cancelled: AtomicBool::new(false),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    #[inline]
    pub fn maxsize(&self) -> Option<usize> {
        self.maxsize
    }

    pub fn empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn full(&self) -> bool {
        self.receiver.is_full()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting items; gets and puts on a closed queue fail
    pub fn close(&self) {
        self.sender.lock().take();
    }

    /// Wait for buffered items to be flushed; only valid after `close`
    ///
    /// Items are handed to the channel synchronously by `put`, so there is
    /// never anything left to flush here.
    pub fn join_thread(&self) -> BridgeResult<()> {
        if !self.is_closed() {
            let message = "join_thread() called before close()".to_string();
            return Err(DelegateError::InvalidOperation(message).into());
        }
        Ok(())
    }

    pub fn cancel_join_thread(&self) {
        self.join_cancelled.store(true, Ordering::Release);
    }

    pub fn join_cancelled(&self) -> bool {
        self.join_cancelled.load(Ordering::Acquire)
    }

    fn sender(&self) -> BridgeResult<Sender<T>> {
        self.sender
            .lock()
            .clone()
            .ok_or_else(|| DelegateError::Closed("queue is closed".into()).into())
    }
}

impl<T: Send + 'static> QueueOps<T> for Queue<T> {
    fn put(&self, item: T, block: bool, timeout: Option<Duration>) -> BridgeResult<()> {
        let sender = self.sender()?;

        let result = match (block, timeout) {
            (false, _) => sender.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => DelegateError::Full,
                TrySendError::Disconnected(_) => closed(),
            }),
            (true, timeout) => match deadline_after(timeout) {
                Some(deadline) => sender.send_deadline(item, deadline).map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => DelegateError::Full,
                    SendTimeoutError::Disconnected(_) => closed(),
                }),
                None => sender.send(item).map_err(|_| closed()),
            },
        };
        Ok(result?)
    }

    fn get(&self, block: bool, timeout: Option<Duration>) -> BridgeResult<T> {
        if self.is_closed() && self.receiver.is_empty() {
            return Err(closed().into());
        }

        let result = match (block, timeout) {
            (false, _) => self.receiver.try_recv().map_err(|e| match e {
                TryRecvError::Empty => DelegateError::Empty,
                TryRecvError::Disconnected => closed(),
            }),
            (true, timeout) => match deadline_after(timeout) {
                Some(deadline) => self.receiver.recv_deadline(deadline).map_err(|e| match e {
                    RecvTimeoutError::Timeout => DelegateError::Empty,
                    RecvTimeoutError::Disconnected => closed(),
                }),
                None => self.receiver.recv().map_err(|_| closed()),
            },
        };
        Ok(result?)
    }

    fn qsize(&self) -> BridgeResult<usize> {
        Ok(self.receiver.len())
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.receiver.len())
            .field("maxsize", &self.maxsize)
            .field("closed", &self.sender.lock().is_none())
            .finish()
    }
}

/// Queue whose consumers acknowledge each item with `task_done`
pub struct JoinableQueue<T> {
    queue: Queue<T>,
    unfinished: Mutex<usize>,
    all_done: Condvar,
}

impl<T: Send + 'static> JoinableQueue<T> {
    pub fn new(maxsize: Option<usize>) -> Self {
        Self {
            queue: Queue::new(maxsize),
            unfinished: Mutex::new(0),
            all_done: Condvar::new(),
        }
    }

    /// Items put but not yet marked done
    pub fn unfinished_tasks(&self) -> usize {
        *self.unfinished.lock()
    }

    pub fn empty(&self) -> bool {
        self.queue.empty()
    }

    pub fn full(&self) -> bool {
        self.queue.full()
    }

    pub fn close(&self) {
        self.queue.close()
    }

    pub fn join_thread(&self) -> BridgeResult<()> {
        self.queue.join_thread()
    }

    pub fn cancel_join_thread(&self) {
        self.queue.cancel_join_thread()
    }

    /// Wait for all items to be processed, up to `timeout`
    pub fn join_timeout(&self, timeout: Option<Duration>) -> bool {
        let mut unfinished = self.unfinished.lock();
        wait_while(&self.all_done, &mut unfinished, timeout, |n| *n > 0)
    }
}

impl<T: Send + 'static> QueueOps<T> for JoinableQueue<T> {
    fn put(&self, item: T, block: bool, timeout: Option<Duration>) -> BridgeResult<()> {
        // Counted first so a fast consumer's task_done never underflows
        *self.unfinished.lock() += 1;
        let result = self.queue.put(item, block, timeout);
        if result.is_err() {
            let mut unfinished = self.unfinished.lock();
            *unfinished -= 1;
            if *unfinished == 0 {
                self.all_done.notify_all();
            }
        }
        result
    }

    fn get(&self, block: bool, timeout: Option<Duration>) -> BridgeResult<T> {
        self.queue.get(block, timeout)
    }

    fn qsize(&self) -> BridgeResult<usize> {
        self.queue.qsize()
    }
}

impl<T: Send + 'static> JoinableQueueOps<T> for JoinableQueue<T> {
    fn task_done(&self) -> BridgeResult<()> {
        let mut unfinished = self.unfinished.lock();
        if *unfinished == 0 {
            return Err(
                DelegateError::InvalidOperation("task_done() called too many times".into()).into(),
            );
        }
        *unfinished -= 1;
        if *unfinished == 0 {
            self.all_done.notify_all();
        }
        Ok(())
    }

    fn join(&self) -> BridgeResult<()> {
        self.join_timeout(None);
        Ok(())
    }
}

impl<T> fmt::Debug for JoinableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinableQueue")
            .field("queue", &self.queue)
            .field("unfinished", &*self.unfinished.lock())
            .finish()
    }
}

/// Unbounded queue with only put, get and empty
pub struct SimpleQueue<T> {
    queue: Queue<T>,
}

impl<T: Send + 'static> SimpleQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Queue::unbounded(),
        }
    }

    pub fn empty(&self) -> bool {
        self.queue.empty()
    }

    pub fn close(&self) {
        self.queue.close()
    }
}

impl<T: Send + 'static> Default for SimpleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> QueueOps<T> for SimpleQueue<T> {
    /// Never blocks: the queue is unbounded
    fn put(&self, item: T, _block: bool, _timeout: Option<Duration>) -> BridgeResult<()> {
        self.queue.put(item, true, None)
    }

    fn get(&self, block: bool, timeout: Option<Duration>) -> BridgeResult<T> {
        self.queue.get(block, timeout)
    }

    fn qsize(&self) -> BridgeResult<usize> {
        self.queue.qsize()
    }
}

impl<T> fmt::Debug for SimpleQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleQueue").field("queue", &self.queue).finish()
    }
}

fn closed() -> DelegateError {
    DelegateError::Closed("queue is closed".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_bounded_queue() {
        let queue = Queue::new(Some(2));
        queue.put(1, true, None).unwrap();
        queue.put_nowait(2).unwrap();
        assert!(queue.full());
        assert_eq!(queue.put_nowait(3), Err(DelegateError::Full.into()));
        assert_eq!(
            queue.put(3, true, Some(Duration::from_millis(5))),
            Err(DelegateError::Full.into())
        );

        assert_eq!(queue.get(true, None), Ok(1));
        assert_eq!(queue.get_nowait(), Ok(2));
        assert_eq!(queue.get_nowait(), Err(DelegateError::Empty.into()));
        assert_eq!(
            queue.get(true, Some(Duration::from_millis(5))),
            Err(DelegateError::Empty.into())
        );
    }

    #[test]
    fn test_huge_timeouts_wait_without_deadline() {
        let queue = Queue::new(Some(1));
        queue.put(7, true, Some(Duration::MAX)).unwrap();
        assert_eq!(queue.get(true, Some(Duration::MAX)), Ok(7));
    }

    #[test]
    fn test_zero_maxsize_is_unbounded() {
        let queue = Queue::new(Some(0));
        for i in 0..100 {
            queue.put_nowait(i).unwrap();
        }
        assert_eq!(queue.qsize(), Ok(100));
        assert_eq!(queue.maxsize(), None);
    }

    #[test]
    fn test_closed_queue() {
        let queue = Queue::unbounded();
        queue.put_nowait("a").unwrap();
        assert!(queue.join_thread().is_err());

        queue.close();
        assert!(matches!(
            queue.put_nowait("b").unwrap_err().delegate(),
            Some(DelegateError::Closed(_))
        ));
        assert_eq!(queue.get_nowait(), Ok("a"));
        assert!(queue.get_nowait().is_err());
        assert!(queue.join_thread().is_ok());
    }

    #[test]
    fn test_joinable_queue_join() {
        let queue = Arc::new(JoinableQueue::new(None));
        for i in 0..3 {
            queue.put(i, true, None).unwrap();
        }
        assert!(!queue.join_timeout(Some(Duration::from_millis(5))));

        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for _ in 0..3 {
                    queue.get(true, None).unwrap();
                    queue.task_done().unwrap();
                }
            })
        };

        queue.join().unwrap();
        consumer.join().unwrap();
        assert_eq!(queue.unfinished_tasks(), 0);
        assert!(queue.task_done().is_err());
    }

    #[test]
    fn test_simple_queue() {
        let queue = SimpleQueue::new();
        assert!(queue.empty());
        queue.put(vec![1, 2], false, None).unwrap();
        assert_eq!(queue.get(true, None), Ok(vec![1, 2]));
    }
}
