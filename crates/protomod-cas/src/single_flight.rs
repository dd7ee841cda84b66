// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use futures::future::{BoxFuture, FutureExt};
use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::OnceCell;

/// A deferred, re-invocable fetch.
pub type FetchFn<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;

/// A value that is fetched on first use and memoized afterwards.
///
/// Concurrent callers of [`SingleFlight::get`] share a single in-flight fetch. Once the
/// fetch completes its result, success or error, is kept for the lifetime of the cell.
/// If the caller driving the fetch is dropped before completion nothing is memoized and
/// the next caller starts a fresh fetch.
pub struct SingleFlight<T, E> {
    cell: OnceCell<Result<T, E>>,
    fetch: FetchFn<T, E>,
    fetch_count: AtomicUsize,
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            fetch: Arc::new(move || fetch().boxed()),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Creates a cell that already holds `value`. The fetch is never run.
    pub fn resolved(value: T) -> Self {
        let fetch_value = value.clone();
        Self {
            cell: OnceCell::new_with(Some(Ok(value))),
            fetch: Arc::new(move || {
                let value = fetch_value.clone();
                async move { Ok(value) }.boxed()
            }),
            fetch_count: AtomicUsize::new(0),
        }
    }

    pub async fn get(&self) -> Result<T, E> {
        self.cell
            .get_or_init(|| {
                self.fetch_count.fetch_add(1, Ordering::SeqCst);
                (self.fetch)()
            })
            .await
            .clone()
    }

    /// Returns the memoized result without triggering a fetch.
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.cell.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }

    /// Number of times the fetch has been started.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

impl<T, E> fmt::Debug for SingleFlight<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("value", &self.cell.get())
            .finish()
    }
}
