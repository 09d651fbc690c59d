use promise_flow::{join_all, run_all, Error, Executor, ExecutorBuilder, ParallelDrain};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

#[test]
fn test_single_worker_thread() {
    let executor = ExecutorBuilder::new().worker_threads(1).build().unwrap();

    let result = executor.submit(|| 42).unwrap().get();
    assert_eq!(result, Ok(42));
}

#[test]
fn test_submit_matches_direct_call() {
    let executor = Executor::default();
    let producer = || (1..=10).map(|i| i * i).sum::<i32>();

    assert_eq!(executor.submit(producer).unwrap().get(), Ok(producer()));
}

#[test]
fn test_worker_threads_parallel_execution() {
    let executor = ExecutorBuilder::new().worker_threads(4).build().unwrap();

    let counter = Arc::new(Mutex::new(0));
    let results = Arc::new(Mutex::new(Vec::new()));

    let futures: Vec<_> = (0..10)
        .map(|i| {
            let counter = counter.clone();
            let results = results.clone();

            executor
                .submit(move || {
                    let mut c = counter.lock().unwrap();
                    *c += 1;
                    drop(c);

                    results.lock().unwrap().push(i);
                    i * 2
                })
                .unwrap()
        })
        .collect();

    let doubled = join_all(futures).get().unwrap();
    assert_eq!(doubled, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    assert_eq!(*counter.lock().unwrap(), 10);
    assert_eq!(results.lock().unwrap().len(), 10);
}

#[test]
fn test_worker_threads_stress() {
    let executor = ExecutorBuilder::new().worker_threads(8).build().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let parsed = run_all(
        &executor,
        (0..100).map(|i| {
            let counter = counter.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                i
            }
        }),
    )
    .unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 100);
    assert_eq!(parsed, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_worker_threads_chain_submit() {
    let executor = ExecutorBuilder::new().worker_threads(4).build().unwrap();
    let (pool1, pool2) = (executor.clone(), executor.clone());

    let result = executor
        .submit(|| 10)
        .unwrap()
        .bind(move |a| pool1.submit(move || a + 20).unwrap())
        .bind(move |b| pool2.submit(move || b + 30).unwrap())
        .map(|c| c + 40)
        .get();

    assert_eq!(result, Ok(100));
}

#[test]
fn test_worker_threads_two_threads() {
    let executor = ExecutorBuilder::new().worker_threads(2).build().unwrap();
    let completed = Arc::new(Mutex::new(HashSet::new()));

    let futures: Vec<_> = (0..20)
        .map(|i| {
            let completed = completed.clone();
            executor
                .submit(move || {
                    completed.lock().unwrap().insert(i);
                    i
                })
                .unwrap()
        })
        .collect();
    join_all(futures).get().unwrap();

    let set = completed.lock().unwrap();
    assert_eq!(set.len(), 20);
    for i in 0..20 {
        assert!(set.contains(&i), "Task {} should have completed", i);
    }
}

#[test]
#[should_panic(expected = "worker_threads must be > 0")]
fn test_worker_threads_zero_panics() {
    let _ = ExecutorBuilder::new().worker_threads(0).build();
}

#[test]
fn test_worker_threads_sequential_executors() {
    for n in 1..=4 {
        let executor = ExecutorBuilder::new().worker_threads(n).build().unwrap();
        let result = executor.submit(move || n * 10).unwrap().get();
        assert_eq!(result, Ok(n * 10));
        executor.shutdown();
        executor.await_termination();
    }
}

#[test]
fn test_graceful_shutdown_drains_queue() {
    let executor = Executor::new(1).unwrap();
    let futures: Vec<_> = (0..5)
        .map(|i| {
            executor
                .submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    i
                })
                .unwrap()
        })
        .collect();

    executor.shutdown();
    assert_eq!(executor.submit(|| 99).err(), Some(Error::PoolShutdown));
    executor.await_termination();

    for (i, future) in futures.iter().enumerate() {
        assert_eq!(future.try_get(), Some(Ok(i)));
    }
}

#[test]
fn test_dropping_executor_finishes_queued_work() {
    let executor = Executor::new(1).unwrap();
    let future = executor
        .submit(|| {
            thread::sleep(Duration::from_millis(20));
            "done"
        })
        .unwrap();
    drop(executor);

    assert_eq!(future.get(), Ok("done"));
}

#[test]
fn test_bounded_queue_applies_backpressure() {
    let executor = ExecutorBuilder::new()
        .worker_threads(1)
        .queue_bound(1)
        .build()
        .unwrap();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let blocker = executor
        .submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
    started_rx.recv().unwrap();
    let queued = executor.submit(|| 1).unwrap();

    let (submitted_tx, submitted_rx) = mpsc::channel();
    let pool = executor.clone();
    let submitter = thread::spawn(move || {
        let future = pool.submit(|| 2).unwrap();
        submitted_tx.send(()).unwrap();
        future.get()
    });

    assert!(submitted_rx.recv_timeout(Duration::from_millis(50)).is_err());
    release_tx.send(()).unwrap();
    submitted_rx.recv().unwrap();

    assert_eq!(blocker.get(), Ok(()));
    assert_eq!(queued.get(), Ok(1));
    assert_eq!(submitter.join().expect("The submitter thread has panicked"), Ok(2));
}

#[test]
fn test_panicking_callback_keeps_worker_alive() {
    let executor = Executor::new(1).unwrap();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let first = executor
        .submit(move || {
            release_rx.recv().unwrap();
            1
        })
        .unwrap();
    first.on_complete(|_| panic!("callback failed"));
    let later = first.map(|v| v + 1);
    release_tx.send(()).unwrap();

    assert_eq!(first.get(), Ok(1));
    assert_eq!(later.get(), Ok(2));
    // The only worker settled `first`, so it must still be taking work.
    let next = executor.submit(|| 5).unwrap();
    assert_eq!(next.get_timeout(Duration::from_secs(2)), Ok(5));
}

#[test]
fn test_continuation_on_full_bounded_queue_does_not_deadlock() {
    let executor = ExecutorBuilder::new()
        .worker_threads(1)
        .queue_bound(1)
        .build()
        .unwrap();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let first = executor
        .submit(move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            1
        })
        .unwrap();
    started_rx.recv().unwrap();
    let mapped = first.map_on(&executor, |v| v + 10);
    // Fills the queue, so the worker settling `first` finds no room.
    let queued = executor.submit(|| 2).unwrap();
    release_tx.send(()).unwrap();

    assert_eq!(mapped.get_timeout(Duration::from_secs(2)), Ok(11));
    assert_eq!(queued.get_timeout(Duration::from_secs(2)), Ok(2));
    assert_eq!(executor.submit(|| 3).unwrap().get(), Ok(3));
}

#[test]
fn test_parallel_drain_matches_run_all() {
    let executor = Executor::new(5).unwrap();
    let drain = ParallelDrain::new().unwrap();
    let inputs = ["11", "12", "13", "14"];

    let via_futures = run_all(&executor, inputs.map(|s| move || s.parse::<i32>().unwrap()));
    let via_drain = drain.map(inputs.to_vec(), |s| s.parse::<i32>().unwrap());

    assert_eq!(via_futures, Ok(vec![11, 12, 13, 14]));
    assert_eq!(via_drain, Ok(vec![11, 12, 13, 14]));
}
