/*!
 * Queue Bridge Integration Tests
 *
 * Offloaded get/put, joinable task tracking, close and join_thread
 */

use aiobridge::prelude::*;
use aiobridge::{aio_joinable_queue, aio_queue, aio_simple_queue, AioQueue, DelegateError};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_async_put_get_preserves_order() {
    let queue: AioQueue<u32> = aio_queue(None, None).unwrap();
    for i in 0..10 {
        queue.async_put(i, None).await.unwrap();
    }
    assert_eq!(queue.qsize(), Ok(10));

    let mut seen = Vec::new();
    for _ in 0..10 {
        seen.push(queue.async_get(None).await.unwrap());
    }
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    assert!(queue.empty());
}

#[tokio::test]
async fn test_async_get_times_out_empty() {
    let queue = aio_queue::<String>(None, None).unwrap();
    let start = Instant::now();
    let err = queue.async_get(Some(Duration::from_millis(30))).await.unwrap_err();
    assert_eq!(err.delegate(), Some(&DelegateError::Empty));
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[tokio::test]
async fn test_bounded_queue_put_times_out_full() {
    let queue = aio_queue::<u8>(Some(1), None).unwrap();
    queue.put_nowait(1).unwrap();
    assert!(queue.full());

    let err = queue.async_put(2, Some(Duration::from_millis(20))).await.unwrap_err();
    assert_eq!(err.delegate(), Some(&DelegateError::Full));
    assert_eq!(queue.get_nowait(), Ok(1));
}

#[tokio::test]
async fn test_unrepresentable_timeouts_do_not_panic() {
    let queue = aio_queue::<u8>(Some(1), None).unwrap();
    queue.async_put(5, Some(Duration::MAX)).await.unwrap();
    assert_eq!(queue.get(true, Some(Duration::MAX)), Ok(5));
}

#[tokio::test]
async fn test_blocked_get_is_woken_by_put_from_thread() {
    let queue = aio_queue::<&'static str>(None, None).unwrap();
    let producer = queue.clone();

    let waiting = queue.async_get(Some(Duration::from_secs(5)));
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        producer.put("hello", true, None).unwrap();
    });
    assert_eq!(waiting.await, Ok("hello"));
}

#[tokio::test]
async fn test_joinable_queue_async_join() {
    let queue = aio_joinable_queue::<u64>(None, None).unwrap();
    let worker = queue.clone();

    for n in 1..=3 {
        queue.async_put(n, None).await.unwrap();
    }
    assert_eq!(queue.unfinished_tasks(), 3);

    let consumer = tokio::spawn(async move {
        let mut total = 0;
        for _ in 0..3 {
            total += worker.async_get(None).await.unwrap();
            worker.task_done().unwrap();
        }
        total
    });

    queue.async_join().await.unwrap();
    assert_eq!(consumer.await.unwrap(), 6);
    assert_eq!(queue.unfinished_tasks(), 0);
}

#[test]
fn test_task_done_too_many_times() {
    let queue = aio_joinable_queue::<()>(None, None).unwrap();
    let err = queue.task_done().unwrap_err();
    assert!(matches!(err.delegate(), Some(DelegateError::InvalidOperation(_))));
}

#[tokio::test]
async fn test_close_flushes_pending_puts_then_join_thread() {
    let queue = aio_queue::<u32>(None, None).unwrap();
    let pending = queue.async_put(7, None);
    queue.close();
    pending.await.unwrap();

    queue.join_thread().unwrap();
    assert_eq!(queue.get_nowait(), Ok(7));

    let err = queue.async_put(8, None).await.unwrap_err();
    assert!(err.delegate().is_none() || matches!(err.delegate(), Some(DelegateError::Closed(_))));
}

#[test]
fn test_join_thread_before_close_fails() {
    let queue = aio_queue::<u32>(None, None).unwrap();
    assert!(queue.join_thread().is_err());
}

#[test]
fn test_cancel_join_thread_returns_immediately() {
    let queue = aio_queue::<u32>(None, None).unwrap();
    queue.cancel_join_thread();
    queue.close();
    queue.join_thread().unwrap();
}

#[tokio::test]
async fn test_simple_queue() {
    let queue = aio_simple_queue::<Vec<u8>>(None).unwrap();
    queue.async_put(vec![1, 2], None).await.unwrap();
    assert!(!queue.empty());
    assert_eq!(queue.async_get(None).await, Ok(vec![1, 2]));
}
