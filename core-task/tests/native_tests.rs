//! Integration tests for core-task driven by a Tokio runtime.

use core_task::{
    wait, wait_result, when_all, when_any, Executor, ExecutorPtr, MultiTaskSource, Task,
    TaskCollection, TaskError, TaskSource, TokioExecutor,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runs `future` on the current Tokio runtime and exposes its output as a task.
fn spawn_task<F>(future: F) -> Task<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut source = TaskSource::new();
    let task = source.get_task();
    tokio::spawn(async move {
        source.resolve(future.await);
    });
    task
}

#[core_task::test]
async fn test_await_spawned_task() {
    let task = spawn_task(async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        42
    });

    assert_eq!(task.await.unwrap(), 42);
}

#[core_task::test]
async fn test_await_rejected_task() {
    let mut source = TaskSource::<u32>::new();
    let task = source.get_task();

    tokio::spawn(async move {
        source.reject(TaskError::failed("container missing"));
    });

    let err = task.await.unwrap_err();
    assert_eq!(err.to_string(), "Task failed: container missing");
}

#[core_task::test]
async fn test_source_dropped_inside_future() {
    let mut source = TaskSource::<String>::new();
    let task = source.get_task();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(source);
    });

    assert!(matches!(task.await, Err(TaskError::SourceDropped)));
}

#[core_task::test]
async fn test_multicast_to_concurrent_futures() {
    let signal = Arc::new(MultiTaskSource::<Vec<u8>>::new());

    let consumers: Vec<_> = (0..10)
        .map(|_| {
            let task = signal.get_next_task();
            tokio::spawn(async move { task.await.unwrap() })
        })
        .collect();

    let producer = Arc::clone(&signal);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        producer.resolve(vec![1, 2, 3]);
    });

    for consumer in consumers {
        assert_eq!(consumer.await.unwrap(), vec![1, 2, 3]);
    }
    assert_eq!(signal.get_next_task().await.unwrap(), vec![1, 2, 3]);
}

#[core_task::test]
async fn test_auto_reset_signal_fires_repeatedly() {
    let signal = Arc::new(MultiTaskSource::<usize>::new());
    signal.set_auto_reset_on_ready(true);

    for round in 0..3 {
        let waiter = signal.get_next_task();
        let producer = Arc::clone(&signal);
        tokio::spawn(async move {
            producer.resolve(round);
        });

        assert_eq!(waiter.await.unwrap(), round);
        assert!(!signal.is_valid());
        signal.emplace();
    }
}

#[core_task::test]
async fn test_run_tasks_while_closing() {
    const TASKS: usize = 5;
    const SUB_TASKS: usize = 20;

    let collection = Arc::new(TaskCollection::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let mut signals = Vec::new();

    for _ in 0..TASKS {
        let mut signal = TaskSource::<()>::new();
        let signal_task = signal.get_task();
        signals.push(signal);

        let collection_ref = Arc::clone(&collection);
        let counter = Arc::clone(&counter);
        collection.push(spawn_task(async move {
            signal_task.await.unwrap();
            for _ in 0..SUB_TASKS {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let counter = Arc::clone(&counter);
                collection_ref.push(spawn_task(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }));
    }

    let closed = collection.dispose_async();
    assert!(collection.is_disposing());
    for signal in &signals {
        signal.resolve(());
    }

    closed.await.unwrap();
    assert!(collection.is_empty());
    assert!(collection.is_disposed());
    assert_eq!(counter.load(Ordering::SeqCst), TASKS * SUB_TASKS);
}

#[core_task::test]
async fn test_when_all_and_when_any_are_awaitable() {
    let slow = spawn_task(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "slow"
    });
    let fast = spawn_task(async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        7u64
    });

    when_any([slow.as_any().unwrap(), fast.as_any().unwrap()])
        .await
        .unwrap();
    assert!(fast.is_ready());

    when_all([&slow]).await.unwrap();
    assert_eq!(slow.await.unwrap(), "slow");
    assert_eq!(fast.await.unwrap(), 7);
}

#[test]
fn test_continuation_runs_on_tokio_executor() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("continuation-worker")
        .build()
        .unwrap();
    let executor: ExecutorPtr = Arc::new(TokioExecutor::new(runtime.handle().clone(), "workers"));
    assert_eq!(executor.name(), "workers");

    let mut source = TaskSource::new();
    let (sender, receiver) = std::sync::mpsc::channel();
    source.get_task().continue_with(Some(executor), move |result| {
        let thread = std::thread::current().name().map(str::to_owned);
        sender.send((result.unwrap(), thread)).unwrap();
    });

    source.resolve(3u8);
    let (value, thread) = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(value, 3);
    assert_eq!(thread.as_deref(), Some("continuation-worker"));
}

#[test]
fn test_blocking_wait_on_collection() {
    let collection = TaskCollection::new();
    let sources: Vec<TaskSource<()>> = (0..4)
        .map(|_| {
            let mut source = TaskSource::new();
            collection.push(source.get_task());
            source
        })
        .collect();

    let closed = collection.dispose_async();
    assert!(!wait(&closed, Some(Duration::from_millis(5))));

    let resolver = std::thread::spawn(move || {
        for source in sources {
            std::thread::sleep(Duration::from_millis(2));
            source.resolve(());
        }
    });

    wait_result(closed).unwrap();
    resolver.join().unwrap();
    assert!(collection.is_disposed());
}
