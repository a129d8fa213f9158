//! Bounded-concurrency work dispatch.
//!
//! Every stage in this crate — resolve, sign, per-batch object download,
//! per-object part fetch — needs the same shape: run a closure over a list
//! of items with at most N in flight at once, using a small OS-thread pool
//! rather than an async runtime. This is that primitive, shared by all of
//! them.

use crate::cancel::CancelToken;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

/// Runs `f` over every item in `items`, with at most `max_concurrent` calls
/// in flight at once. Results are returned in the same order as `items`
/// regardless of completion order. A panic inside `f` is caught and turned
/// into `None` for that item's slot so one bad item cannot wedge the pool.
///
/// When `cancel` is set and tripped, worker threads stop pulling new items
/// from the queue as soon as they finish whatever call is already in flight
/// (§5): unstarted items are left `None`, matching how a single bad item
/// that panics is reported. This is the only cancellation granularity a pool
/// of blocking calls can offer without aborting a transfer mid-stream.
pub fn run_bounded<T, R, F>(items: Vec<T>, max_concurrent: usize, cancel: Option<&CancelToken>, f: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let max_concurrent = max_concurrent.max(1).min(total);
    let work: Arc<Mutex<VecDeque<(usize, T)>>> =
        Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
    let f = Arc::new(f);
    let cancel = cancel.cloned();
    let (tx, rx) = mpsc::channel::<(usize, Option<R>)>();

    let mut handles = Vec::with_capacity(max_concurrent);
    for _ in 0..max_concurrent {
        let work = Arc::clone(&work);
        let f = Arc::clone(&f);
        let tx = tx.clone();
        let cancel = cancel.clone();
        handles.push(std::thread::spawn(move || loop {
            if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                break;
            }
            let next = work.lock().unwrap().pop_front();
            let Some((index, item)) = next else { break };
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(item))).ok();
            if tx.send((index, result)).is_err() {
                break;
            }
        }));
    }
    drop(tx);

    let mut out: Vec<Option<R>> = (0..total).map(|_| None).collect();
    for (index, result) in rx {
        out[index] = result;
    }
    for h in handles {
        let _ = h.join();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn preserves_order_regardless_of_completion_order() {
        let items: Vec<u32> = (0..20).collect();
        let results = run_bounded(items, 4, None, |i| {
            std::thread::sleep(std::time::Duration::from_millis((20 - i as u64) % 5));
            i * 2
        });
        let expected: Vec<Option<u32>> = (0..20).map(|i| Some(i * 2)).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn respects_concurrency_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..30).collect();
        let in_flight_cl = Arc::clone(&in_flight);
        let max_seen_cl = Arc::clone(&max_seen);
        let results = run_bounded(items, 3, None, move |_| {
            let now = in_flight_cl.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen_cl.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            in_flight_cl.fetch_sub(1, Ordering::SeqCst);
            ()
        });
        assert_eq!(results.len(), 30);
        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn empty_input_returns_empty() {
        let results: Vec<Option<u32>> = run_bounded(Vec::<u32>::new(), 4, None, |i| i);
        assert!(results.is_empty());
    }

    #[test]
    fn cancelling_stops_further_dispatch() {
        let token = CancelToken::new();
        let cancel_after = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..50).collect();
        let token_cl = token.clone();
        let cancel_after_cl = Arc::clone(&cancel_after);
        let results = run_bounded(items, 1, Some(&token), move |i| {
            if i == 2 {
                token_cl.cancel();
            }
            cancel_after_cl.fetch_add(1, Ordering::SeqCst);
            i
        });
        let processed = cancel_after.load(Ordering::SeqCst) as usize;
        assert!(processed < 50, "cancellation must stop dispatch before the queue drains");
        assert!(results.iter().skip(processed).all(Option::is_none));
    }
}
