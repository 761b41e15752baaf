//! Scaling behavior: workers are created before any task buffers, and the
//! pool shrinks back to core size after the keep-alive.

use crossbeam::channel;
use scalepool::{PoolConfig, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_workers_grow_to_max_before_buffering() {
    let pool = WorkerPool::new(PoolConfig::new(
        "grow",
        2,
        4,
        Duration::from_secs(60),
    ))
    .unwrap();
    let (gate_tx, gate_rx) = channel::unbounded::<()>();
    let done = Arc::new(AtomicUsize::new(0));

    let block = || {
        let gate = gate_rx.clone();
        let done = done.clone();
        move || {
            gate.recv().ok();
            done.fetch_add(1, Ordering::SeqCst);
        }
    };

    // Six long-running tasks against core=2, max=4: the live count is
    // reserved synchronously in submit, so worker counts are exact here.
    for i in 0..4 {
        pool.submit(block()).unwrap();
        assert_eq!(pool.worker_count(), i + 1);
        assert_eq!(pool.queue_depth(), 0, "no task may buffer while workers can be created");
    }

    pool.submit(block()).unwrap();
    pool.submit(block()).unwrap();
    assert_eq!(pool.worker_count(), 4, "pool must not exceed max_size");
    assert_eq!(pool.queue_depth(), 2, "tasks past max_size buffer");

    for _ in 0..6 {
        gate_tx.send(()).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || {
        done.load(Ordering::SeqCst) == 6
    }));
    assert_eq!(pool.worker_count(), 4);
}

#[test]
fn test_idle_workers_retire_to_core_size() {
    let pool = WorkerPool::new(PoolConfig::new(
        "retire",
        1,
        3,
        Duration::from_millis(100),
    ))
    .unwrap();
    let (gate_tx, gate_rx) = channel::unbounded::<()>();

    for _ in 0..3 {
        let gate = gate_rx.clone();
        pool.submit(move || {
            gate.recv().ok();
        })
        .unwrap();
    }
    assert_eq!(pool.worker_count(), 3);

    for _ in 0..3 {
        gate_tx.send(()).unwrap();
    }

    // Two elastic workers retire after the keep-alive; the core worker stays.
    assert!(wait_until(Duration::from_secs(5), || pool.worker_count() == 1));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(pool.worker_count(), 1);
    assert!(pool.metrics().workers_retired >= 2);
}

#[test]
fn test_no_task_loss_with_zero_core_and_rapid_retirement() {
    // With core_size == 0 the worker set repeatedly collapses to zero
    // between submissions; tasks landing in the buffer during the collapse
    // must still run.
    let pool = WorkerPool::new(PoolConfig::new(
        "churn",
        0,
        2,
        Duration::from_millis(1),
    ))
    .unwrap();
    let done = Arc::new(AtomicUsize::new(0));

    let total = 200;
    for i in 0..total {
        let done = done.clone();
        pool.submit(move || {
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        if i % 10 == 0 {
            // Let the keep-alive elapse so the workers retire.
            thread::sleep(Duration::from_millis(3));
        }
    }

    assert!(
        wait_until(Duration::from_secs(10), || {
            done.load(Ordering::SeqCst) == total
        }),
        "expected {} executions, saw {}",
        total,
        done.load(Ordering::SeqCst)
    );
    assert!(wait_until(Duration::from_secs(5), || pool.worker_count() == 0));
}

#[test]
fn test_no_task_loss_under_concurrent_submission() {
    let pool = Arc::new(
        WorkerPool::new(PoolConfig::new(
            "flood",
            2,
            8,
            Duration::from_millis(20),
        ))
        .unwrap(),
    );
    let done = Arc::new(AtomicUsize::new(0));

    let producers = 4;
    let per_producer = 200;
    let mut handles = Vec::new();
    for _ in 0..producers {
        let pool = pool.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_producer {
                let done = done.clone();
                pool.submit(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = producers * per_producer;
    assert!(
        wait_until(Duration::from_secs(10), || {
            done.load(Ordering::SeqCst) == expected
        }),
        "expected {} executions, saw {}",
        expected,
        done.load(Ordering::SeqCst)
    );

    assert_eq!(pool.metrics().tasks_submitted, expected as u64);
    // Execution counters trail the task bodies slightly.
    assert!(wait_until(Duration::from_secs(5), || {
        pool.metrics().tasks_executed == expected as u64
    }));
    assert_eq!(pool.metrics().tasks_panicked, 0);
}
