use std::{io, num::NonZeroUsize, sync::Arc, thread};

use blocking::unblock;
use easy_parallel::Parallel;
use smol::{channel, future, future::Future, Executor};

/// Reads one line from stdin without blocking the executor.
pub async fn read_line_async() -> Result<String, io::Error> {
    unblock(|| {
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        Ok(input)
    })
    .await
}

/// Drives the executor on all available cores while the main future runs
/// on the current thread.
pub fn run_executor<T>(main_future: impl Future<Output = T>, ex: Arc<Executor<'_>>) {
    let (signal, shutdown) = channel::unbounded::<()>();

    let num_threads = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);

    Parallel::new()
        .each(0..num_threads, |_| future::block_on(ex.run(shutdown.recv())))
        .finish(|| {
            future::block_on(async {
                main_future.await;
                drop(signal);
            })
        });
}
