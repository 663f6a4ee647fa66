//! Scheduling integration tests
//!
//! Drives tasks through the scheduling center and checks the ordering and
//! concurrency guarantees of each executor flavour.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;
use taskpipe::config::PipeConfig;
use taskpipe::{
    BoundedExecutor, ChainJob, MainLoop, Priority, SchedulerConfig, SchedulingCenter, Task, TaskExecutor, TaskStatus,
};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

type Unit = ChainJob<(), (), ()>;

fn center_with(config: &SchedulerConfig) -> (SchedulingCenter, MainLoop) {
    let (main, main_loop) = MainLoop::new();
    let center = SchedulingCenter::new(config, main).unwrap();
    (center, main_loop)
}

fn all_finished<J: taskpipe::Job>(tasks: &[Task<J>]) -> bool {
    tasks.iter().all(|t| t.status() == TaskStatus::Finished)
}

/// Task that holds its executor slot until `release` fires.
fn gate_task(center: &SchedulingCenter, executor: Arc<dyn TaskExecutor>) -> (Task<Unit>, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    let gate = Mutex::new(gate);
    let started_tx = Mutex::new(started_tx);
    let task = center.task_on(
        executor,
        Unit::new().background(move |_, _| {
            started_tx.lock().send(()).unwrap();
            let _ = gate.lock().recv_timeout(WAIT);
            Ok(())
        }),
    );
    task.execute(vec![]).unwrap();
    started_rx.recv_timeout(WAIT).unwrap();
    (task, release)
}

#[test]
fn test_window_never_exceeded() {
    let mut config = SchedulerConfig::default();
    config.io = PipeConfig::new(3, 0);
    let (center, main_loop) = center_with(&config);
    let executor: Arc<dyn TaskExecutor> = Arc::new(center.io().clone());
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..12)
        .map(|_| {
            let (running, peak) = (running.clone(), peak.clone());
            let task = center.task_on(
                executor.clone(),
                Unit::new().background(move |_, _| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(15));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
            task.execute(vec![]).unwrap();
            task
        })
        .collect();

    assert!(main_loop.run_until(WAIT, || all_finished(&tasks)));
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[test]
fn test_priority_order_behind_busy_window() {
    let (center, main_loop) = center_with(&SchedulerConfig::default());
    let pipe = BoundedExecutor::new("single", &PipeConfig::new(1, 0), center.pool().clone());
    let executor: Arc<dyn TaskExecutor> = Arc::new(pipe);
    let (_blocker, release) = gate_task(&center, executor.clone());
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = [("A", Priority::Low), ("B", Priority::High), ("C", Priority::Normal)]
        .into_iter()
        .map(|(label, priority)| {
            let order = order.clone();
            let task = center.task_on(
                executor.clone(),
                ChainJob::<(), (), ()>::new().background(move |_, _| {
                    order.lock().push(label);
                    Ok(())
                }),
            );
            task.priority(priority);
            task.execute(vec![]).unwrap();
            task
        })
        .collect();

    release.send(()).unwrap();
    assert!(main_loop.run_until(WAIT, || all_finished(&tasks)));
    assert_eq!(*order.lock(), vec!["B", "C", "A"]);
}

#[test]
fn test_immediate_runs_while_window_full() {
    let (center, main_loop) = center_with(&SchedulerConfig::default());
    let pipe = BoundedExecutor::new("single", &PipeConfig::new(1, 0), center.pool().clone());
    let executor: Arc<dyn TaskExecutor> = Arc::new(pipe);
    let (blocker, release) = gate_task(&center, executor.clone());

    let urgent = center.task_on(executor.clone(), ChainJob::<(), (), u8>::new().background(|_, _| Ok(1)));
    urgent.priority(Priority::Immediate);
    urgent.execute(vec![]).unwrap();

    // Completes while the only slot is still held
    assert_eq!(urgent.result_timeout(WAIT).unwrap(), 1);
    assert!(!blocker.is_done());

    release.send(()).unwrap();
    assert!(main_loop.run_until(WAIT, || blocker.status() == TaskStatus::Finished));
}

#[test]
fn test_dedup_lane_two_complete_three_cancel() {
    let (center, main_loop) = center_with(&SchedulerConfig::default());
    let completed = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));
    let (release, gate) = mpsc::channel::<()>();
    let gate = Arc::new(Mutex::new(gate));

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let (completed, cancelled, gate) = (completed.clone(), cancelled.clone(), gate.clone());
            let task = center.io_task(
                Unit::new()
                    .tag("reload")
                    .background(move |_, _| {
                        let _ = gate.lock().recv_timeout(WAIT);
                        Ok(())
                    })
                    .success(move |_| {
                        completed.fetch_add(1, Ordering::SeqCst);
                    })
                    .cancelled(move || {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }),
            );
            task.execute(vec![]).unwrap();
            task
        })
        .collect();

    assert_eq!(center.lane_io().waiting_len("reload"), 1);
    release.send(()).unwrap();
    release.send(()).unwrap();

    assert!(main_loop.run_until(WAIT, || all_finished(&tasks)));
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert_eq!(cancelled.load(Ordering::SeqCst), 3);
    assert!(!center.lane_io().is_scheduled("reload"));
}

#[test]
fn test_serial_lane_in_order_without_overlap() {
    let (center, main_loop) = center_with(&SchedulerConfig::default());
    let running = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicUsize::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let (running, overlapped, order) = (running.clone(), overlapped.clone(), order.clone());
            let task = center.serial_task(
                ChainJob::<(), (), usize>::new()
                    .tag("journal")
                    .background(move |_, _| {
                        if running.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlapped.fetch_add(1, Ordering::SeqCst);
                        }
                        std::thread::sleep(Duration::from_millis(10));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    })
                    .success(move |i| order.lock().push(*i)),
            );
            task.execute(vec![]).unwrap();
            task
        })
        .collect();

    assert!(main_loop.run_until(WAIT, || all_finished(&tasks)));
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(overlapped.load(Ordering::SeqCst), 0);
}

#[test]
fn test_untagged_tasks_skip_lanes() {
    let (center, main_loop) = center_with(&SchedulerConfig::default());
    let barrier = Arc::new(std::sync::Barrier::new(2));

    // Both must run at once for either to finish
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let barrier = barrier.clone();
            let task = center.io_task(Unit::new().background(move |_, _| {
                barrier.wait();
                Ok(())
            }));
            task.execute(vec![]).unwrap();
            task
        })
        .collect();

    assert!(main_loop.run_until(WAIT, || all_finished(&tasks)));
    assert!(tasks.iter().all(|t| !t.is_cancelled()));
}

#[test]
fn test_center_from_config_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("taskpipe.yml");
    std::fs::write(&path, "io:\n  window: 2\n  capacity: 4\npool:\n  thread-name: io-test\n").unwrap();

    let config = SchedulerConfig::load(Some(&path)).unwrap();
    let (center, _main_loop) = center_with(&config);
    let stats = center.stats();

    assert_eq!(stats[0].name, "io");
    assert_eq!(stats[0].window, 2);
    assert_eq!(stats[0].capacity, Some(4));
}
