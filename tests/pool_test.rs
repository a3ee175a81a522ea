/*!
 * Pool Bridge Integration Tests
 */

use aiobridge::prelude::*;
use aiobridge::pool::PoolState;
use aiobridge::{aio_pool, AioPool, DelegateError};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_async_apply() {
    let pool = AioPool::new(Some(2)).unwrap();
    assert_eq!(pool.async_apply(|| 6 * 7).await, Ok(42));
}

#[tokio::test]
async fn test_async_map_preserves_order() {
    let pool = aio_pool(Some(3), None).unwrap();
    let items: Vec<u64> = (0..50).collect();
    let squares = pool.async_map(|x| x * x, items, Some(4)).await.unwrap();
    assert_eq!(squares, (0..50).map(|x| x * x).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_async_starmap() {
    let pool = AioPool::new(Some(2)).unwrap();
    let pairs = vec![(1u32, 2u32), (3, 4), (5, 6)];
    let products = pool.async_starmap(|a: u32, b: u32| a * b, pairs, None).await;
    assert_eq!(products, Ok(vec![2, 12, 30]));
}

#[tokio::test]
async fn test_panicking_task_surfaces_task_failed() {
    let pool = AioPool::new(Some(1)).unwrap();
    let err = pool
        .async_apply(|| -> u8 { panic!("worker blew up") })
        .await
        .unwrap_err();
    assert!(matches!(
        err.delegate(),
        Some(DelegateError::TaskFailed(msg)) if msg.contains("worker blew up")
    ));

    // The worker survives the panic
    assert_eq!(pool.async_apply(|| 1).await, Ok(1));
}

#[test]
fn test_sync_api_unchanged() {
    let pool = AioPool::new(Some(2)).unwrap();
    assert_eq!(pool.apply(|| "sync"), Ok("sync"));
    assert_eq!(pool.map(|x: i32| x + 1, vec![1, 2, 3], None), Ok(vec![2, 3, 4]));

    let pending = pool.apply_async(|| 5).unwrap();
    assert!(pending.wait(Some(Duration::from_secs(5))));
    assert_eq!(pending.successful(), Some(true));
    assert_eq!(pending.get(None), Ok(5));
}

#[tokio::test]
async fn test_close_then_async_join() {
    let pool = AioPool::new(Some(2)).unwrap();
    pool.async_apply(|| std::thread::sleep(Duration::from_millis(10))).await.unwrap();

    let err = pool.async_join(Some(Duration::from_millis(10))).await.unwrap_err();
    assert!(matches!(err.delegate(), Some(DelegateError::InvalidOperation(_))));

    pool.close();
    assert_eq!(pool.state(), PoolState::Closed);
    assert_eq!(pool.async_join(Some(Duration::from_secs(5))).await, Ok(true));
    assert_eq!(pool.alive(), 0);

    assert!(pool.async_apply(|| 0).await.is_err());
}

#[tokio::test]
async fn test_terminate_fails_queued_tasks() {
    let pool = AioPool::new(Some(1)).unwrap();
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let blocker = pool.async_apply(move || {
        started_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
    });
    let queued = pool.async_apply(|| 2);
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    pool.terminate();

    blocker.await.unwrap();
    let err = queued.await.unwrap_err();
    assert!(matches!(err.delegate(), Some(DelegateError::TaskFailed(_))));
    assert_eq!(pool.async_join(Some(Duration::from_secs(5))).await, Ok(true));
}
