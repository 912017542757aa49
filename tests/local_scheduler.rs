// tests/local_scheduler.rs

mod common;
use crate::common::{init_tracing, with_timeout, StepBuilder, TaskBuilder};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use tokio::sync::{mpsc, watch};

use tierflow::engine::{run_once, run_scheduled, Engine};
use tierflow::errors::TierflowError;
use tierflow::exec::{FnHandler, FunctionRegistry, HandlerContext, HandlerRegistry};
use tierflow::scheduler::local::{LocalScheduler, LocalSchedulerOptions};
use tierflow::scheduler::{CompletionListener, JobKey, SchedulerAdapter};
use tierflow::task::Task;
use tierflow::tier::{ExecutionStatus, JobUnit, RunPhase};
use tierflow::types::StepType;

fn options(max_workers: usize) -> LocalSchedulerOptions {
    LocalSchedulerOptions {
        max_workers,
        job_timeout: None,
    }
}

fn script_task(name: &str, steps: &[(u32, &str, &str)]) -> Task {
    let mut builder = TaskBuilder::new(name);
    for (order, step, cmd) in steps {
        builder = builder.with_step(
            StepBuilder::new(step)
                .order(*order)
                .step_type("script")
                .param("path", *cmd)
                .build(),
        );
    }
    builder.build()
}

/// Scheduler whose script handler only counts invocations.
fn counting_scheduler(count: &Arc<AtomicUsize>, max_workers: usize) -> Arc<LocalScheduler> {
    let count = Arc::clone(count);
    let handler = move |_: &JobUnit| -> anyhow::Result<()> {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };
    let registry = HandlerRegistry::new().with(StepType::Script, Arc::new(FnHandler(handler)));
    LocalScheduler::spawn(registry, HandlerContext::default(), options(max_workers))
}

struct ChannelListener(mpsc::UnboundedSender<(String, bool)>);

impl CompletionListener for ChannelListener {
    fn on_completion(&self, step: &str, success: bool) {
        let _ = self.0.send((step.to_string(), success));
    }
}

fn builtin_scheduler(max_workers: usize) -> Arc<LocalScheduler> {
    LocalScheduler::spawn(
        HandlerRegistry::builtin(FunctionRegistry::new()),
        HandlerContext::default(),
        options(max_workers),
    )
}

#[tokio::test]
async fn test_script_steps_run_tier_by_tier() {
    init_tracing();
    let task = script_task("T1", &[(1, "A", "true"), (1, "B", "true"), (2, "C", "true")]);
    let engine = Engine::from_tasks(&[task], builtin_scheduler(4));

    let outcome = with_timeout(engine.run_task("T1")).await.unwrap();

    assert_eq!(outcome.phase, RunPhase::Completed);
    assert!(outcome.statuses.values().all(|s| *s == ExecutionStatus::Completed));
    assert_eq!(outcome.run_id, 1);
    assert!(engine.active_runs().is_empty());
}

#[tokio::test]
async fn test_failing_script_halts_run() {
    init_tracing();
    let task = script_task("T1", &[(1, "A", "false"), (1, "B", "true"), (2, "C", "true")]);
    let engine = Engine::from_tasks(&[task], builtin_scheduler(4));

    let outcome = with_timeout(engine.run_task("T1")).await.unwrap();

    assert_eq!(
        outcome.phase,
        RunPhase::Halted {
            tier: 1,
            failed: vec!["A".to_string()]
        }
    );
    assert_eq!(outcome.statuses["B"], ExecutionStatus::Completed);
    assert_eq!(outcome.statuses["C"], ExecutionStatus::New);

    match outcome.into_result() {
        Err(TierflowError::StepExecution { task, step, tier }) => {
            assert_eq!((task.as_str(), step.as_str(), tier), ("T1", "A", 1));
        }
        other => panic!("expected StepExecution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tier_waits_for_slowest_job() {
    init_tracing();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let record = {
        let log = Arc::clone(&log);
        move |unit: &tierflow::tier::JobUnit| -> anyhow::Result<()> {
            if unit.name == "slow" {
                std::thread::sleep(Duration::from_millis(150));
            }
            log.lock().unwrap().push(unit.name.clone());
            Ok(())
        }
    };
    let registry = HandlerRegistry::new().with(StepType::Script, Arc::new(FnHandler(record)));
    let scheduler = LocalScheduler::spawn(registry, HandlerContext::default(), options(4));

    let task = TaskBuilder::new("T1")
        .step(1, "slow")
        .step(1, "fast")
        .step(2, "next")
        .build();
    let engine = Engine::from_tasks(&[task], scheduler);

    let outcome = with_timeout(engine.run_task("T1")).await.unwrap();
    assert_eq!(outcome.phase, RunPhase::Completed);

    let log = log.lock().unwrap().clone();
    assert_eq!(log.last().map(String::as_str), Some("next"));
    assert_eq!(log.len(), 3);
}

#[tokio::test]
async fn test_max_workers_bounds_parallel_jobs() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handler = {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        move |_: &tierflow::tier::JobUnit| -> anyhow::Result<()> {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    };
    let registry = HandlerRegistry::new().with(StepType::Script, Arc::new(FnHandler(handler)));
    let scheduler = LocalScheduler::spawn(registry, HandlerContext::default(), options(2));

    let mut builder = TaskBuilder::new("wide");
    for i in 0..6 {
        builder = builder.step(1, &format!("s{i}"));
    }
    let engine = Engine::from_tasks(&[builder.build()], scheduler);

    let outcome = with_timeout(engine.run_task("wide")).await.unwrap();

    assert_eq!(outcome.phase, RunPhase::Completed);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_job_timeout_counts_as_failure() {
    init_tracing();
    let scheduler = LocalScheduler::spawn(
        HandlerRegistry::builtin(FunctionRegistry::new()),
        HandlerContext::default(),
        LocalSchedulerOptions {
            max_workers: 1,
            job_timeout: Some(Duration::from_millis(200)),
        },
    );
    let task = script_task("T1", &[(1, "sleepy", "sleep 5"), (2, "never", "true")]);
    let engine = Engine::from_tasks(&[task], scheduler);

    let outcome = with_timeout(engine.run_task("T1")).await.unwrap();

    assert!(matches!(outcome.phase, RunPhase::Halted { tier: 1, .. }));
    assert_eq!(outcome.statuses["never"], ExecutionStatus::New);
}

#[tokio::test]
async fn test_custom_function_receives_job_data() {
    let seen = Arc::new(Mutex::new(None::<String>));
    let mut functions = FunctionRegistry::new();
    {
        let seen = Arc::clone(&seen);
        functions.register("remember_task", move |data| {
            *seen.lock().unwrap() = data.get_str("task_name").map(str::to_string);
            Ok(())
        });
    }
    functions.register("explode", |_| bail!("boom"));

    let scheduler = LocalScheduler::spawn(
        HandlerRegistry::builtin(functions),
        HandlerContext::default(),
        options(2),
    );
    let task = TaskBuilder::new("fn_task")
        .with_step(
            StepBuilder::new("ok")
                .order(1)
                .step_type("custom_function")
                .param("function", "remember_task")
                .build(),
        )
        .with_step(
            StepBuilder::new("bad")
                .order(2)
                .step_type("func")
                .param("function", "explode")
                .build(),
        )
        .build();
    let engine = Engine::from_tasks(&[task], scheduler);

    let outcome = with_timeout(engine.run_task("fn_task")).await.unwrap();

    assert_eq!(seen.lock().unwrap().as_deref(), Some("fn_task"));
    assert_eq!(
        outcome.phase,
        RunPhase::Halted {
            tier: 2,
            failed: vec!["bad".to_string()]
        }
    );
}

#[tokio::test]
async fn test_overlapping_run_is_skipped() {
    let scheduler = builtin_scheduler(2);
    let task = script_task("T1", &[(1, "wait", "sleep 0.3")]);
    let engine = Engine::from_tasks(&[task], scheduler);

    let first = engine.start_run("T1").unwrap().expect("first run starts");
    assert!(engine.start_run("T1").unwrap().is_none());
    assert_eq!(engine.active_runs(), vec!["T1"]);

    let phase = with_timeout(first.wait_finished()).await;
    assert_eq!(phase, RunPhase::Completed);

    let second = engine.start_run("T1").unwrap().expect("second run starts");
    assert_eq!(second.run_id(), first.run_id() + 1);
    with_timeout(second.wait_finished()).await;
}

#[tokio::test]
async fn test_run_once_summarises_all_tasks() {
    init_tracing();
    let tasks = vec![
        script_task("good", &[(1, "a", "true"), (2, "b", "true")]),
        script_task("bad", &[(1, "a", "false"), (2, "b", "true")]),
        TaskBuilder::new("empty").build(),
        script_task("invalid", &[(0, "a", "true")]),
    ];
    let engine = Arc::new(Engine::from_tasks(&tasks, builtin_scheduler(4)));

    assert_eq!(engine.task_names(), vec!["good", "bad"]);
    let skipped: Vec<&str> = engine.skipped().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(skipped, vec!["empty", "invalid"]);

    let summary = with_timeout(run_once(Arc::clone(&engine), None)).await.unwrap();

    assert!(!summary.all_succeeded());
    assert_eq!(summary.failed_tasks(), vec!["bad"]);
    let names: Vec<&str> = summary.outcomes.iter().map(|o| o.task.as_str()).collect();
    assert_eq!(names, vec!["bad", "good"]);

    let only_good = with_timeout(run_once(Arc::clone(&engine), Some("good"))).await.unwrap();
    assert!(only_good.all_succeeded());

    assert!(matches!(
        run_once(engine, Some("missing")).await,
        Err(TierflowError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_trigger_of_unknown_handle_is_rejected() {
    let scheduler = builtin_scheduler(1);

    match scheduler.trigger(&JobKey::new("T1", "nobody")) {
        Err(TierflowError::SchedulerRegistration(msg)) => assert!(msg.contains("T1.nobody")),
        other => panic!("expected SchedulerRegistration, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_handler_fails_the_job() {
    let scheduler = LocalScheduler::spawn(
        HandlerRegistry::new(),
        HandlerContext::default(),
        options(1),
    );
    let engine = Engine::from_tasks(&[TaskBuilder::new("T1").step(1, "a").build()], scheduler);

    let outcome = with_timeout(engine.run_task("T1")).await.unwrap();
    assert!(matches!(outcome.phase, RunPhase::Halted { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_back_to_back_reruns_all_finish() {
    init_tracing();
    let count = Arc::new(AtomicUsize::new(0));
    let task = TaskBuilder::new("T").step(1, "only").build();
    let engine = Engine::from_tasks(&[task], counting_scheduler(&count, 2));

    for round in 1..=300u64 {
        let outcome = with_timeout(engine.run_task("T")).await.unwrap();
        assert_eq!(outcome.phase, RunPhase::Completed, "round {round}");
        assert_eq!(outcome.run_id, round);
    }

    assert_eq!(count.load(Ordering::SeqCst), 300);
    assert!(engine.active_runs().is_empty());
}

#[tokio::test]
async fn test_stale_unsubscribe_keeps_newer_listener() {
    let count = Arc::new(AtomicUsize::new(0));
    let scheduler = counting_scheduler(&count, 1);

    let (old_tx, mut old_rx) = mpsc::unbounded_channel();
    let (new_tx, mut new_rx) = mpsc::unbounded_channel();
    let old = scheduler
        .subscribe("T1", Arc::new(ChannelListener(old_tx)))
        .unwrap();
    let new = scheduler
        .subscribe("T1", Arc::new(ChannelListener(new_tx)))
        .unwrap();
    assert_ne!(old, new);

    // The earlier registration going away must not take the newer one with it.
    scheduler.unsubscribe("T1", old).unwrap();

    let unit = TaskBuilder::new("T1").step(1, "a").plan().iter().next().cloned().unwrap();
    let handle = scheduler.submit(unit).unwrap();
    scheduler.trigger(&handle).unwrap();

    assert_eq!(with_timeout(new_rx.recv()).await, Some(("a".to_string(), true)));
    assert!(old_rx.try_recv().is_err());

    scheduler.unsubscribe("T1", new).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cron_loop_fires_runs_until_shutdown() {
    init_tracing();
    let count = Arc::new(AtomicUsize::new(0));
    let task = TaskBuilder::new("tick")
        .cron("* * * * * *")
        .step(1, "only")
        .build();
    let engine = Arc::new(Engine::from_tasks(&[task], counting_scheduler(&count, 1)));

    let (stop_tx, stop_rx) = watch::channel(false);
    let looping = tokio::spawn(run_scheduled(Arc::clone(&engine), Some("tick"), stop_rx));

    // Every run has one step, and a run only starts once the previous one
    // finished, so two handler calls mean two completed cron runs.
    with_timeout(async {
        while count.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    stop_tx.send(true).unwrap();
    with_timeout(looping).await.unwrap().unwrap();

    with_timeout(async {
        while !engine.active_runs().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let fired = count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(count.load(Ordering::SeqCst), fired, "runs fired after shutdown");
}

#[tokio::test]
async fn test_shutdown_stops_waiting_cron_loop() {
    let count = Arc::new(AtomicUsize::new(0));
    let task = TaskBuilder::new("yearly")
        .cron("0 0 0 1 1 ?")
        .step(1, "only")
        .build();
    let engine = Arc::new(Engine::from_tasks(&[task], counting_scheduler(&count, 1)));

    let (stop_tx, stop_rx) = watch::channel(false);
    let looping = tokio::spawn(run_scheduled(engine, None, stop_rx));
    tokio::time::sleep(Duration::from_millis(20)).await;

    stop_tx.send(true).unwrap();

    with_timeout(looping).await.unwrap().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_run_scheduled_rejects_unknown_task() {
    let engine = Arc::new(Engine::from_tasks(
        &[TaskBuilder::new("T1").step(1, "a").build()],
        builtin_scheduler(1),
    ));
    let (_stop_tx, stop_rx) = watch::channel(false);

    assert!(matches!(
        run_scheduled(engine, Some("missing"), stop_rx).await,
        Err(TierflowError::TaskNotFound(_))
    ));
}
