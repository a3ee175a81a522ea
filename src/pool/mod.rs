/*!
 * Task Pool
 *
 * `TaskPool` runs closures on its own worker threads; `AioPool` awaits them.
 * Async results are driven by the pool's completion callbacks, so no offload
 * worker is tied up while a task runs. Only `async_join` is offloaded.
 */

mod aio;
mod result;
mod task_pool;

pub use aio::AioPool;
pub use result::AsyncResult;
pub use task_pool::{PoolState, TaskPool};

/// A function taking its arguments as one tuple, for `starmap`
///
/// Implemented for every `Fn` of one to six arguments.
pub trait StarFn<Args>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn call_star(&self, args: Args) -> Self::Output;
}

macro_rules! impl_star_fn {
    ($($arg:ident),+) => {
        impl<Func, Out, $($arg),+> StarFn<($($arg,)+)> for Func
        where
            Func: Fn($($arg),+) -> Out + Send + Sync + 'static,
            Out: Send + 'static,
        {
            type Output = Out;

            #[allow(non_snake_case)]
            fn call_star(&self, ($($arg,)+): ($($arg,)+)) -> Out {
                self($($arg),+)
            }
        }
    };
}

impl_star_fn!(A);
impl_star_fn!(A, B);
impl_star_fn!(A, B, C);
impl_star_fn!(A, B, C, D);
impl_star_fn!(A, B, C, D, E);
impl_star_fn!(A, B, C, D, E, F);
