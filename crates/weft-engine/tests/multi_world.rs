//! Orchestrating several worlds built from world descriptions.

use std::sync::Arc;

use weft_engine::{
    ConfigError, HostConfig, Orchestrator, PluginDescription, RunError, Runner, RunnerError,
    WorkerPool, WorldDescription,
};
use weft_test_utils::{init_test_logging, CountingFactory, CountingRunner, MapLoader, PhasedRunner};

fn world(name: &str, plugins: &[(&str, &str)]) -> WorldDescription {
    plugins
        .iter()
        .fold(WorldDescription::new(name), |w, (plugin, file)| {
            w.with_plugin(PluginDescription::new(*plugin, *file))
        })
}

fn three_worlds() -> Vec<WorldDescription> {
    vec![
        world("alpha", &[("physics", "libphysics.so")]),
        world("beta", &[("physics", "libphysics.so"), ("audio", "libaudio.so")]),
        world("gamma", &[]),
    ]
}

#[test]
fn runners_follow_world_order_with_loaded_systems() {
    init_test_logging();
    let loader = MapLoader::new().with("libphysics.so");
    let factory = CountingFactory::new();
    let orch = Orchestrator::builder(HostConfig::default())
        .worlds(&three_worlds(), &loader, &factory)
        .unwrap()
        .build()
        .unwrap();

    let names: Vec<_> = orch.runner_names().collect();
    assert_eq!(names, ["alpha", "beta", "gamma"]);
    assert_eq!(loader.attempts(), 3);

    // libaudio.so is unknown to the loader: skipped, not fatal.
    let created = factory.created();
    assert_eq!(created[0].systems, ["physics"]);
    assert_eq!(created[1].systems, ["physics"]);
    assert!(created[2].systems.is_empty());
    assert_eq!(orch.runner(1).map(|r| r.name()), Some("beta"));
}

#[test]
fn failing_runner_fails_the_run_but_siblings_complete() {
    init_test_logging();
    let factory = CountingFactory::new().fail_world("beta");
    let orch = Orchestrator::builder(HostConfig::default())
        .worlds(&three_worlds(), &MapLoader::new(), &factory)
        .unwrap()
        .build()
        .unwrap();

    let err = orch.run(50).unwrap_err();
    match &err {
        RunError::RunnersFailed { runners, failures } => {
            assert_eq!(*runners, 3);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, 1);
            assert_eq!(failures[0].world, "beta");
        }
        other => panic!("unexpected error: {other}"),
    }

    for name in ["alpha", "beta", "gamma"] {
        assert_eq!(factory.runner(name).unwrap().executed(), 50, "{name}");
    }
    assert!(!orch.is_running());
}

#[test]
fn single_runner_matches_pooled_dispatch() {
    let inline_runner = CountingRunner::new("solo").failing();
    let inline = Orchestrator::builder(HostConfig::default())
        .runner("solo", Box::new(inline_runner.clone()))
        .unwrap()
        .build()
        .unwrap();

    let pool = WorkerPool::new(1, "solo-pool").unwrap();
    let pooled_runner = CountingRunner::new("solo").failing();
    let unit_runner = pooled_runner.clone();
    let mut batch = pool.batch();
    batch.add_work(move || unit_runner.advance(9).is_ok());
    let pooled_ok = batch.wait_for_results();

    let inline_result = inline.run(9);
    assert_eq!(inline_result.is_ok(), pooled_ok);
    assert_eq!(inline_runner.executed(), pooled_runner.executed());

    let ok_runner = CountingRunner::new("ok");
    let inline_ok = Orchestrator::builder(HostConfig::default())
        .runner("ok", Box::new(ok_runner.clone()))
        .unwrap()
        .build()
        .unwrap();
    let mut batch = pool.batch();
    let unit_runner = CountingRunner::new("ok");
    batch.add_work(move || unit_runner.advance(9).is_ok());
    assert_eq!(inline_ok.run(9).is_ok(), batch.wait_for_results());
}

#[test]
fn shared_pool_serves_two_orchestrators() {
    let pool = Arc::new(WorkerPool::new(2, "shared").unwrap());
    let build = |prefix: &str| {
        let runners: Vec<_> = (0..3)
            .map(|i| CountingRunner::new(format!("{prefix}{i}")))
            .collect();
        let mut builder = Orchestrator::builder(HostConfig::default()).pool(Arc::clone(&pool));
        for r in &runners {
            builder = builder
                .runner(r.name().to_owned(), Box::new(r.clone()))
                .unwrap();
        }
        (builder.build().unwrap(), runners)
    };
    let (left, left_runners) = build("l");
    let (right, right_runners) = build("r");

    std::thread::scope(|s| {
        let a = s.spawn(|| left.run(20));
        let b = s.spawn(|| right.run(30));
        assert!(a.join().unwrap().is_ok());
        assert!(b.join().unwrap().is_ok());
    });

    assert!(left_runners.iter().all(|r| r.executed() == 20));
    assert!(right_runners.iter().all(|r| r.executed() == 30));
    assert!(Arc::ptr_eq(left.pool().unwrap(), &pool));
}

#[test]
fn phased_runners_step_in_lockstep_through_the_pool() {
    let phased: Vec<_> = (0..3).map(|i| PhasedRunner::new(format!("p{i}"), 3, 4)).collect();
    let mut builder = Orchestrator::builder(HostConfig {
        worker_count: Some(3),
        ..Default::default()
    });
    for p in &phased {
        builder = builder.runner(p.name().to_owned(), Box::new(p.clone())).unwrap();
    }
    let orch = builder.build().unwrap();

    assert!(orch.run(25).is_ok());
    assert!(orch.run(25).is_ok());
    for p in &phased {
        assert_eq!(p.cycles(), 200);
        assert_eq!(p.violations(), 0);
    }
}

#[test]
fn phased_runner_failure_does_not_block_siblings() {
    let healthy = PhasedRunner::new("healthy", 2, 2);
    let broken = PhasedRunner::new("broken", 2, 2).fail_at_cycle(3);
    let orch = Orchestrator::builder(HostConfig::default())
        .runner("healthy", Box::new(healthy.clone()))
        .unwrap()
        .runner("broken", Box::new(broken.clone()))
        .unwrap()
        .build()
        .unwrap();

    let err = orch.run(10).unwrap_err();
    assert_eq!(err.failures().len(), 1);
    assert_eq!(err.failures()[0].world, "broken");
    assert!(matches!(
        err.failures()[0].error,
        RunnerError::StepFailed { .. }
    ));
    assert_eq!(healthy.cycles(), 20);
}

#[test]
fn factory_rejection_aborts_the_build() {
    let factory = CountingFactory::new().reject_world("gamma");
    let result =
        Orchestrator::builder(HostConfig::default()).worlds(&three_worlds(), &MapLoader::new(), &factory);
    match result {
        Err(ConfigError::RunnerCreation { world, source }) => {
            assert_eq!(world, "gamma");
            assert!(matches!(source, RunnerError::Construction { .. }));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("build should have failed"),
    }
}

#[test]
fn duplicate_world_names_are_rejected() {
    let worlds = vec![world("same", &[]), world("same", &[])];
    let result =
        Orchestrator::builder(HostConfig::default()).worlds(&worlds, &MapLoader::new(), &CountingFactory::new());
    assert!(matches!(result, Err(ConfigError::DuplicateWorld { .. })));
}
