// crates/mnemo/src/store/writequeue.rs
// Single-consumer FIFO write executor serializing every hot-store mutation
// and archive append. See DESIGN.md for why a serialized queue is used
// instead of a pooled-connection-with-retry-backoff write path.

use futures::future::BoxFuture;
use mnemo_types::WriteQueueStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Serializes writes to the hot store and archive through a single
/// background consumer, so two concurrent callers never interleave
/// mutations.
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
    total_writes: Arc<AtomicU64>,
    queue_high_water: Arc<AtomicUsize>,
    current_queue: Arc<AtomicUsize>,
}

impl WriteQueue {
    /// `inter_task_delay` paces consecutive writes, smoothing
    /// write-amplification bursts; zero disables it.
    pub fn new(inter_task_delay: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
        let current_queue = Arc::new(AtomicUsize::new(0));
        let worker_queue = current_queue.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
                worker_queue.fetch_sub(1, Ordering::SeqCst);
                if !inter_task_delay.is_zero() {
                    tokio::time::sleep(inter_task_delay).await;
                }
            }
        });

        Self {
            tx,
            total_writes: Arc::new(AtomicU64::new(0)),
            queue_high_water: Arc::new(AtomicUsize::new(0)),
            current_queue,
        }
    }

    /// Enqueue `f` and await its result. Jobs run strictly in submission
    /// order; no two jobs ever run concurrently.
    pub async fn enqueue<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let total_writes = self.total_writes.clone();
        let job: BoxFuture<'static, ()> = Box::pin(async move {
            let result = f().await;
            total_writes.fetch_add(1, Ordering::SeqCst);
            let _ = result_tx.send(result);
        });

        let depth = self.current_queue.fetch_add(1, Ordering::SeqCst) + 1;
        self.queue_high_water.fetch_max(depth, Ordering::SeqCst);

        if self.tx.send(job).is_err() {
            // Worker task is gone (process shutting down); there is no
            // meaningful recovery, only a clear panic at the call site.
            panic!("write queue worker task has terminated");
        }

        result_rx
            .await
            .expect("write queue worker dropped the result channel")
    }

    pub fn stats(&self) -> WriteQueueStats {
        WriteQueueStats {
            total_writes: self.total_writes.load(Ordering::SeqCst),
            current_queue: self.current_queue.load(Ordering::SeqCst),
            queue_max: self.queue_high_water.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn serializes_concurrent_writes() {
        let queue = Arc::new(WriteQueue::new(Duration::from_millis(0)));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let queue = queue.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(move || async move {
                        log.lock().unwrap().push(format!("start-{i}"));
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        log.lock().unwrap().push(format!("end-{i}"));
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let log = log.lock().unwrap();
        // every start must be immediately followed by its own end: no
        // interleaving of two in-flight jobs.
        for pair in log.chunks(2) {
            let start = &pair[0];
            let end = &pair[1];
            let id = start.strip_prefix("start-").unwrap();
            assert_eq!(end, &format!("end-{id}"));
        }
        assert_eq!(queue.stats().total_writes, 20);
    }

    #[tokio::test]
    async fn stats_report_high_water_mark() {
        let queue = WriteQueue::new(Duration::from_millis(5));
        let (a, b, c) = (
            queue.enqueue(|| async { 1u32 }),
            queue.enqueue(|| async { 2u32 }),
            queue.enqueue(|| async { 3u32 }),
        );
        let (a, b, c) = tokio::join!(a, b, c);
        assert_eq!(a + b + c, 6);
        assert!(queue.stats().queue_max >= 1);
        assert_eq!(queue.stats().current_queue, 0);
    }
}
