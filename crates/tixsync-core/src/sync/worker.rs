//! Engine-owned page worker and cooperative cancellation

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Bounded pool for blocking page-processing jobs.
///
/// Jobs run on the blocking thread pool, at most `size` at a time. After
/// [`PageWorker::shutdown`] new submissions fail.
#[derive(Debug, Clone)]
pub struct PageWorker {
    permits: Arc<Semaphore>,
}

impl PageWorker {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run `job` once a slot is free.
    pub async fn submit<F, T>(&self, job: F) -> Result<PageTask<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Worker("page worker is shut down".to_string()))?;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        Ok(PageTask { handle })
    }

    pub fn shutdown(&self) {
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct PageTask<T> {
    handle: JoinHandle<T>,
}

impl<T> PageTask<T> {
    pub async fn join(self) -> Result<T> {
        self.await
    }
}

impl<T> Future for PageTask<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(|error| Error::Worker(error.to_string())))
    }
}

/// Shared cancellation flag, checked before every page fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_runs_job() {
        let worker = PageWorker::new(1);
        let task = worker.submit(|| 40 + 2).await.unwrap();
        assert_eq!(task.join().await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn submit_after_shutdown_fails() {
        let worker = PageWorker::new(2);
        worker.shutdown();
        assert!(worker.is_shutdown());
        assert!(matches!(
            worker.submit(|| ()).await,
            Err(Error::Worker(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_job_surfaces_worker_error() {
        let worker = PageWorker::new(1);
        let task = worker.submit(|| panic!("boom")).await.unwrap();
        assert!(matches!(task.join().await, Err(Error::Worker(_))));

        let task = worker.submit(|| "still usable").await.unwrap();
        assert_eq!(task.join().await.unwrap(), "still usable");
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::default();
        let clone = flag.clone();
        assert!(flag.check().is_ok());

        clone.cancel();
        assert!(matches!(flag.check(), Err(Error::Cancelled)));

        flag.reset();
        assert!(!clone.is_cancelled());
    }
}
