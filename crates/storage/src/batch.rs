// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic batch writer: coalesces high-rate row inserts into bulk flushes,
//! triggered by size or by a timer armed on the first row into an empty
//! buffer. A single dedicated worker task owns the buffer and processes one
//! flush at a time.

use relay_core::Metrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::warn;

pub type FlushFn<T> =
    Arc<dyn Fn(Vec<T>) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// Thrown back to the caller of [`BatchWriter::add`] when the internal
/// queue is full. The row was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

pub struct BatchWriterHandle<T: Send + 'static> {
    tx: mpsc::Sender<T>,
    shutdown: Arc<Notify>,
    joined: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> BatchWriterHandle<T> {
    /// Non-blocking add. Returns [`QueueFull`] if the internal channel's
    /// capacity is exhausted.
    pub fn add(&self, row: T) -> Result<(), QueueFull> {
        self.tx.try_send(row).map_err(|_| QueueFull)
    }

    /// Stop accepting new rows, flush whatever remains, and wait for the
    /// worker to finish.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        drop(self.tx);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    pub fn flushes_completed(&self) -> u64 {
        self.joined.load(Ordering::Relaxed)
    }
}

pub struct BatchWriterConfig {
    pub name: &'static str,
    pub max_size: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

impl BatchWriterConfig {
    pub fn new(name: &'static str, max_size: usize, flush_interval: Duration) -> Self {
        Self { name, max_size, flush_interval, channel_capacity: max_size.saturating_mul(4).max(16) }
    }
}

/// Spawn a batch writer worker. `flush` is invoked with the buffered rows
/// whenever the buffer reaches `max_size`, the flush timer fires, or the
/// writer is stopped with a non-empty buffer.
pub fn spawn<T>(
    config: BatchWriterConfig,
    metrics: Arc<Metrics>,
    flush: FlushFn<T>,
) -> BatchWriterHandle<T>
where
    T: Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<T>(config.channel_capacity);
    let shutdown = Arc::new(Notify::new());
    let shutdown_worker = Arc::clone(&shutdown);
    let joined = Arc::new(AtomicU64::new(0));
    let joined_worker = Arc::clone(&joined);
    let name = config.name;
    let max_size = config.max_size;
    let flush_interval = config.flush_interval;

    let join = tokio::spawn(async move {
        let mut buf: Vec<T> = Vec::with_capacity(max_size);
        let mut stopping = false;

        loop {
            let sleep = tokio::time::sleep(flush_interval);
            tokio::pin!(sleep);

            tokio::select! {
                biased;

                _ = shutdown_worker.notified(), if !stopping => {
                    stopping = true;
                }

                maybe_row = rx.recv(), if !stopping => {
                    match maybe_row {
                        Some(row) => {
                            buf.push(row);
                            if buf.len() >= max_size {
                                flush_batch(name, &flush, &mut buf, &metrics, &joined_worker).await;
                            }
                        }
                        None => stopping = true,
                    }
                }

                _ = &mut sleep, if !buf.is_empty() && !stopping => {
                    flush_batch(name, &flush, &mut buf, &metrics, &joined_worker).await;
                }
            }

            if stopping {
                // Drain whatever is already queued, then do a final flush.
                while let Ok(row) = rx.try_recv() {
                    buf.push(row);
                }
                if !buf.is_empty() {
                    flush_batch(name, &flush, &mut buf, &metrics, &joined_worker).await;
                }
                break;
            }
        }
    });

    BatchWriterHandle { tx, shutdown, joined, join: Some(join) }
}

async fn flush_batch<T: Send + 'static>(
    name: &'static str,
    flush: &FlushFn<T>,
    buf: &mut Vec<T>,
    metrics: &Arc<Metrics>,
    joined: &Arc<AtomicU64>,
) {
    let rows = std::mem::take(buf);
    let n = rows.len();
    match flush(rows).await {
        Ok(()) => {
            Metrics::incr(&metrics.batch_flushes);
            joined.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            Metrics::incr(&metrics.batch_flush_failures);
            warn!(writer = name, rows = n, error = %err, "batch flush failed, rows dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn flushes_on_max_size() {
        let flushed: Arc<StdMutex<Vec<Vec<u32>>>> = Arc::new(StdMutex::new(Vec::new()));
        let flushed_cl = Arc::clone(&flushed);
        let flush: FlushFn<u32> = Arc::new(move |rows: Vec<u32>| {
            let flushed_cl = Arc::clone(&flushed_cl);
            Box::pin(async move {
                flushed_cl.lock().unwrap().push(rows);
                Ok(())
            })
        });

        let handle = spawn(
            BatchWriterConfig::new("test", 3, Duration::from_secs(60)),
            Arc::new(Metrics::default()),
            flush,
        );

        handle.add(1).unwrap();
        handle.add(2).unwrap();
        handle.add(3).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(flushed.lock().unwrap().len(), 1);
        assert_eq!(flushed.lock().unwrap()[0], vec![1, 2, 3]);

        handle.stop().await;
    }

    #[tokio::test]
    async fn flushes_remaining_rows_on_stop() {
        let flushed: Arc<StdMutex<Vec<Vec<u32>>>> = Arc::new(StdMutex::new(Vec::new()));
        let flushed_cl = Arc::clone(&flushed);
        let flush: FlushFn<u32> = Arc::new(move |rows: Vec<u32>| {
            let flushed_cl = Arc::clone(&flushed_cl);
            Box::pin(async move {
                flushed_cl.lock().unwrap().push(rows);
                Ok(())
            })
        });

        let handle = spawn(
            BatchWriterConfig::new("test", 100, Duration::from_secs(60)),
            Arc::new(Metrics::default()),
            flush,
        );

        handle.add(1).unwrap();
        handle.add(2).unwrap();
        handle.stop().await;

        assert_eq!(flushed.lock().unwrap().len(), 1);
        assert_eq!(flushed.lock().unwrap()[0], vec![1, 2]);
    }
}
