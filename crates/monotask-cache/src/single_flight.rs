use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, Mutex};

/// Collapses concurrent identical cache operations (same task hash) into a
/// single in-flight future; latecomers await the first caller's result
/// instead of repeating the fetch or put. Not grounded on a single teacher
/// file (the teacher has no `single_flight` primitive of its own); the shape
/// follows the `broadcast`-channel pattern `tokio::sync` idiomatically
/// supports and is this crate's own addition. See DESIGN.md.
pub struct SingleFlight<T: Clone + Send + 'static> {
    inflight: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `op` for `key` unless another caller is already running it, in
    /// which case this call awaits that caller's broadcast result instead.
    pub async fn run<F, Fut>(self: &Arc<Self>, key: &str, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let mut receiver = {
            let mut inflight = self.inflight.lock().await;
            if let Some(sender) = inflight.get(key) {
                Some(sender.subscribe())
            } else {
                let (sender, _) = broadcast::channel(1);
                inflight.insert(key.to_string(), sender);
                None
            }
        };

        if let Some(receiver) = receiver.take() {
            let mut receiver = receiver;
            return receiver
                .recv()
                .await
                .expect("leader always sends before dropping its sender");
        }

        let result = op().await;

        let mut inflight = self.inflight.lock().await;
        if let Some(sender) = inflight.remove(key) {
            let _ = sender.send(result.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn concurrent_calls_for_the_same_key_run_once() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("same-key", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_keys_both_run() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new());
        let a = flight.run("a", || async { 1 }).await;
        let b = flight.run("b", || async { 2 }).await;
        assert_eq!((a, b), (1, 2));
    }
}
