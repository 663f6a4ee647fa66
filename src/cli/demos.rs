//! Demo scenarios behind the CLI subcommands.
//!
//! Every scenario builds a fresh scheduling center, drives the owner loop on
//! the calling thread and prints what it observed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use colored::*;
use eyre::{Context, Result};
use log::info;
use parking_lot::Mutex;

use taskpipe::config::PipeConfig;
use taskpipe::{
    BoundedExecutor, ChainJob, LifeEvent, MainLoop, OwnerId, Priority, SchedulerConfig, SchedulingCenter, TaskExecutor,
    TaskStatus,
};

const DEMO_TIMEOUT: Duration = Duration::from_secs(30);

fn center(config: &SchedulerConfig) -> Result<(SchedulingCenter, MainLoop)> {
    let (main, main_loop) = MainLoop::new();
    let center = SchedulingCenter::new(config, main).context("Failed to start scheduling center")?;
    Ok((center, main_loop))
}

fn drain(main_loop: &MainLoop, done: impl FnMut() -> bool) -> Result<()> {
    if !main_loop.run_until(DEMO_TIMEOUT, done) {
        eyre::bail!("Demo did not finish within {:?}", DEMO_TIMEOUT);
    }
    Ok(())
}

pub fn window(config: &SchedulerConfig, tasks: usize) -> Result<()> {
    let (center, main_loop) = center(config)?;
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let executor: Arc<dyn TaskExecutor> = Arc::new(center.io().clone());

    info!("Window demo: {} tasks on io (window {})", tasks, center.io().window());
    let started = Instant::now();
    for _ in 0..tasks {
        let (running, peak, finished) = (running.clone(), peak.clone(), finished.clone());
        let job = ChainJob::<(), (), ()>::new()
            .background(move |_, ctx| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let slept = ctx.sleep(Duration::from_millis(50));
                running.fetch_sub(1, Ordering::SeqCst);
                slept?;
                Ok(())
            })
            .success(move |_| {
                finished.fetch_add(1, Ordering::SeqCst);
            });
        center.task_on(executor.clone(), job).execute(vec![])?;
    }

    drain(&main_loop, || finished.load(Ordering::SeqCst) == tasks)?;
    println!(
        "{} {} tasks in {} ms, peak concurrency {} (window {})",
        "Done:".green(),
        tasks,
        started.elapsed().as_millis(),
        peak.load(Ordering::SeqCst),
        center.io().window()
    );
    Ok(())
}

pub fn priority(config: &SchedulerConfig) -> Result<()> {
    let (center, main_loop) = center(config)?;
    let pipe = BoundedExecutor::new("priority-demo", &PipeConfig::new(1, 0), center.pool().clone());
    let executor: Arc<dyn TaskExecutor> = Arc::new(pipe);
    let order = Arc::new(Mutex::new(Vec::new()));

    let blocker = center.task_on(
        executor.clone(),
        ChainJob::<(), (), ()>::new().background(|_, ctx| {
            ctx.sleep(Duration::from_millis(100))?;
            Ok(())
        }),
    );
    blocker.execute(vec![])?;

    let mut tasks = Vec::new();
    for (label, priority) in [("A", Priority::Low), ("B", Priority::High), ("C", Priority::Normal)] {
        let order = order.clone();
        let task = center.task_on(
            executor.clone(),
            ChainJob::<(), (), &'static str>::new()
                .background(move |_, _| Ok(label))
                .success(move |label| order.lock().push(*label)),
        );
        task.priority(priority);
        task.execute(vec![])?;
        println!("  queued {} at {:?}", label.bold(), priority);
        tasks.push(task);
    }

    drain(&main_loop, || tasks.iter().all(|t| t.status() == TaskStatus::Finished))?;
    println!("{} {}", "Run order:".green(), order.lock().join(", "));
    Ok(())
}

pub fn dedup(config: &SchedulerConfig, count: usize) -> Result<()> {
    let (center, main_loop) = center(config)?;
    let completed = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..count {
        let (completed, cancelled) = (completed.clone(), cancelled.clone());
        let task = center.io_task(
            ChainJob::<(), (), usize>::new()
                .tag("refresh")
                .background(move |_, ctx| {
                    ctx.sleep(Duration::from_millis(100))?;
                    Ok(i)
                })
                .success(move |i| {
                    println!("  {} #{}", "completed".green(), i);
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .cancelled(move || {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                }),
        );
        task.execute(vec![])?;
        tasks.push(task);
    }

    drain(&main_loop, || tasks.iter().all(|t| t.status() == TaskStatus::Finished))?;
    println!(
        "{} {} completed, {} cancelled",
        "Dedup lane:".green(),
        completed.load(Ordering::SeqCst),
        cancelled.load(Ordering::SeqCst)
    );
    Ok(())
}

pub fn serial(config: &SchedulerConfig, count: usize) -> Result<()> {
    let (center, main_loop) = center(config)?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for i in 0..count {
        let order = order.clone();
        let task = center.serial_task(
            ChainJob::<(), (), usize>::new()
                .tag("serial")
                .background(move |_, ctx| {
                    ctx.sleep(Duration::from_millis(20))?;
                    Ok(i)
                })
                .success(move |i| order.lock().push(*i)),
        );
        task.execute(vec![])?;
        tasks.push(task);
    }

    drain(&main_loop, || tasks.iter().all(|t| t.status() == TaskStatus::Finished))?;
    let order: Vec<String> = order.lock().iter().map(ToString::to_string).collect();
    println!("{} {}", "Serial order:".green(), order.join(" -> "));
    Ok(())
}

pub fn chain(config: &SchedulerConfig) -> Result<()> {
    let (center, main_loop) = center(config)?;

    let task = center.cpu_task(
        ChainJob::<u64, u64, u64>::new()
            .tag("chain-demo")
            .setup(|| println!("{}", "Setting up".cyan()))
            .background(|params, ctx| {
                let mut total = 0;
                for (i, n) in params.iter().enumerate() {
                    ctx.check_cancelled()?;
                    total += n;
                    ctx.sleep(Duration::from_millis(20))?;
                    ctx.publish_one((i as u64 + 1) * 100 / params.len() as u64);
                }
                Ok(total)
            })
            .progress(|values| {
                for v in values {
                    println!("  progress {}%", v);
                }
            })
            .success(|total| println!("{} sum = {}", "Done:".green(), total))
            .cancelled(|| println!("{}", "Cancelled".red())),
    );
    task.execute((1..=5).collect())?;

    drain(&main_loop, || task.status() == TaskStatus::Finished)?;
    if let Some(elapsed) = task.elapsed() {
        println!("  background took {} ms", elapsed.as_millis());
    }
    Ok(())
}

/// Stand-in for a screen whose lifetime bounds its tasks.
struct Screen {
    name: &'static str,
}

pub fn lifecycle(config: &SchedulerConfig, count: usize) -> Result<()> {
    let (center, main_loop) = center(config)?;
    let screen = Screen { name: "detail" };
    let owner = OwnerId::of(&screen);
    let cancelled = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for i in 0..count {
        let cancelled = cancelled.clone();
        let task = center.io_task(
            ChainJob::<(), (), ()>::new()
                .tag(format!("{}-{}", screen.name, i))
                .background(|_, ctx| {
                    ctx.sleep(Duration::from_secs(10))?;
                    Ok(())
                })
                .cancelled(move || {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                }),
        );
        task.bind_to(&screen);
        task.execute(vec![])?;
        tasks.push(task);
    }

    println!("{} {} tasks bound to {}", "Started:".cyan(), count, owner);
    println!("  hide notified {} listener(s)", center.notify(owner, LifeEvent::Hide));
    println!("  show notified {} listener(s)", center.notify(owner, LifeEvent::Show));
    let started = Instant::now();
    println!("  destroy notified {} listener(s)", center.notify(owner, LifeEvent::Destroy));

    drain(&main_loop, || tasks.iter().all(|t| t.status() == TaskStatus::Finished))?;
    println!(
        "{} {} cancelled in {} ms",
        "Destroyed:".green(),
        cancelled.load(Ordering::SeqCst),
        started.elapsed().as_millis()
    );
    Ok(())
}

pub fn stats(config: &SchedulerConfig, json: bool) -> Result<()> {
    let (center, _main_loop) = center(config)?;
    let stats = center.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?);
        return Ok(());
    }

    for s in &stats {
        let capacity = s.capacity.map_or_else(|| "unlimited".to_string(), |c| c.to_string());
        println!(
            "{:<12} window {:<3} capacity {:<9} active {:<3} queued {}",
            s.name.bold(),
            s.window,
            capacity,
            s.active,
            s.queued
        );
    }
    Ok(())
}
