mod common;

use common::{init_tracing, Timeline, DISCIPLINES};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tasksys::prelude::*;

fn engines() -> Vec<Box<dyn TaskSystem>> {
    let mut engines: Vec<Box<dyn TaskSystem>> = vec![
        Box::new(SerialRuntime::new()),
        Box::new(SpawnRuntime::new(4).unwrap()),
    ];
    for discipline in DISCIPLINES {
        engines.push(Box::new(Runtime::new(4, discipline).unwrap()));
    }
    engines
}

#[test]
fn test_chain_runs_in_order() {
    init_tracing();

    for engine in engines() {
        let timeline = Timeline::new();
        let mut prev: Option<BulkId> = None;
        let mut ids = Vec::new();

        for _ in 0..8 {
            let deps: Vec<BulkId> = prev.into_iter().collect();
            let tag = ids.len() as u64 + 1;
            let id = engine
                .run_async_with_deps(timeline.runnable(tag), 16, &deps)
                .unwrap();
            ids.push(id);
            prev = Some(id);
        }
        engine.sync().unwrap();

        for tag in 1..8u64 {
            assert!(
                timeline.happened_before(tag, tag + 1),
                "{}: link {} -> {}",
                engine.name(),
                tag,
                tag + 1
            );
        }
    }
}

#[test]
fn test_fan_out_fan_in() {
    for engine in engines() {
        let timeline = Timeline::new();
        let source = engine
            .run_async_with_deps(timeline.runnable(0), 4, &[])
            .unwrap();

        let branches: Vec<BulkId> = (1..=6)
            .map(|tag| {
                engine
                    .run_async_with_deps(timeline.runnable(tag), 32, &[source])
                    .unwrap()
            })
            .collect();

        engine
            .run_async_with_deps(timeline.runnable(99), 4, &branches)
            .unwrap();
        engine.sync().unwrap();

        for tag in 1..=6 {
            assert!(timeline.happened_before(0, tag), "{}", engine.name());
            assert!(timeline.happened_before(tag, 99), "{}", engine.name());
        }
    }
}

#[test]
fn test_diamond() {
    for engine in engines() {
        let timeline = Timeline::new();
        let a = engine.run_async_with_deps(timeline.runnable(1), 8, &[]).unwrap();
        let b = engine.run_async_with_deps(timeline.runnable(2), 8, &[a]).unwrap();
        let c = engine.run_async_with_deps(timeline.runnable(3), 8, &[a]).unwrap();
        engine
            .run_async_with_deps(timeline.runnable(4), 8, &[b, c])
            .unwrap();
        engine.sync().unwrap();

        assert!(timeline.happened_before(1, 2));
        assert!(timeline.happened_before(1, 3));
        assert!(timeline.happened_before(2, 4));
        assert!(timeline.happened_before(3, 4));
    }
}

#[test]
fn test_dependency_on_bulk_from_earlier_sync() {
    for discipline in DISCIPLINES {
        let rt = Runtime::new(2, discipline).unwrap();
        let timeline = Timeline::new();

        let a = rt.run_async_with_deps(timeline.runnable(1), 4, &[]).unwrap();
        rt.sync().unwrap();

        let b = rt.run_async_with_deps(timeline.runnable(2), 4, &[a]).unwrap();
        assert_eq!(rt.pending_bulks(), 1);
        rt.sync().unwrap();

        assert!(timeline.happened_before(1, 2));
        assert_eq!(rt.bulk_state(b), Some(BulkState::Complete));
    }
}

#[test]
fn test_random_dags_respect_every_edge() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for engine in engines() {
        for round in 0..10 {
            let timeline = Timeline::new();
            let nodes = rng.gen_range(2..24);
            let mut ids: Vec<BulkId> = Vec::with_capacity(nodes);
            let mut edges: Vec<(u64, u64)> = Vec::new();

            for tag in 0..nodes as u64 {
                let mut deps = Vec::new();
                for (earlier, &id) in ids.iter().enumerate() {
                    if rng.gen_bool(0.25) {
                        deps.push(id);
                        edges.push((earlier as u64, tag));
                    }
                }
                let total = rng.gen_range(0..40);
                let id = engine
                    .run_async_with_deps(timeline.runnable(tag), total, &deps)
                    .unwrap();
                ids.push(id);
            }

            engine.sync().unwrap();

            for &(before, after) in &edges {
                // empty bulks leave no span to compare
                if timeline.span(before).is_none() || timeline.span(after).is_none() {
                    continue;
                }
                assert!(
                    timeline.happened_before(before, after),
                    "{} round {}: edge {} -> {}",
                    engine.name(),
                    round,
                    before,
                    after
                );
            }
        }
    }
}

#[test]
fn test_random_dag_matches_serial_completion() {
    let mut rng = StdRng::seed_from_u64(42);
    let serial = SerialRuntime::new();
    let pooled = Runtime::new(3, WaitDiscipline::Block).unwrap();

    let mut plan: Vec<(usize, Vec<usize>)> = Vec::new();
    for node in 0..30 {
        let deps: Vec<usize> = (0..node).filter(|_| rng.gen_bool(0.1)).collect();
        plan.push((rng.gen_range(1..20), deps));
    }

    let engines: [&dyn TaskSystem; 2] = [&serial, &pooled];
    let mut finished = Vec::new();
    for engine in engines {
        let timeline = Timeline::new();
        let mut ids = Vec::new();
        for (tag, (total, deps)) in plan.iter().enumerate() {
            let deps: Vec<BulkId> = deps.iter().map(|&d| ids[d]).collect();
            ids.push(
                engine
                    .run_async_with_deps(timeline.runnable(tag as u64), *total, &deps)
                    .unwrap(),
            );
        }
        engine.sync().unwrap();
        finished.push((0..plan.len() as u64).all(|tag| timeline.span(tag).is_some()));
    }

    assert_eq!(finished, vec![true, true]);
}
