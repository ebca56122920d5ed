use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration as WallDuration;

use ossim_rs::core::{Duration, SimTime, Simulation, StopReason};
use ossim_rs::scenario::Scenario;
use ossim_rs::scheduler::Policy;
use ossim_rs::Simulator;
use tokio::sync::watch;

fn two_jobs() -> Simulator {
    let mut sim = Simulator::new();
    sim.set_policy(Policy::RoundRobin);
    sim.create_process("P0", 0.0, 4.0, 0, BTreeMap::new()).unwrap();
    sim.create_process("P1", 0.0, 3.0, 0, BTreeMap::new()).unwrap();
    sim
}

#[tokio::test]
async fn test_run_until_completion() {
    let simulation = Simulation::new(two_jobs()).with_period(WallDuration::from_millis(1));
    let (_stop, cancel) = watch::channel(false);

    let summary = simulation.run_until(SimTime::new(100.0), cancel).await.unwrap();
    assert_eq!(summary.reason, StopReason::Completed);
    assert_eq!(summary.ticks, 7);
    assert_eq!(summary.time, SimTime::new(7.0));
    assert_eq!(summary.metrics.unwrap().completed, 2);
}

#[tokio::test]
async fn test_run_for_stops_at_time_limit() {
    let simulation = Simulation::new(two_jobs()).with_period(WallDuration::from_millis(1));
    let (_stop, cancel) = watch::channel(false);

    let summary = simulation.run_for(Duration::from_seconds(3.0), cancel).await.unwrap();
    assert_eq!(summary.reason, StopReason::TimeLimit);
    assert_eq!(summary.time, SimTime::new(3.0));
    assert!(summary.metrics.is_none());

    // Состояние осталось доступным и согласованным
    let handle = simulation.handle();
    let sim = handle.lock().await;
    assert_eq!(sim.timeline().dispatch_order().len(), 2);
}

#[tokio::test]
async fn test_cancel_stops_between_ticks() {
    let simulation = Simulation::new(two_jobs()).with_period(WallDuration::from_millis(50));
    let (stop, cancel) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(WallDuration::from_millis(75)).await;
        stop.send(true).unwrap();
    });

    let summary = simulation.run_until(SimTime::new(100.0), cancel).await.unwrap();
    stopper.await.unwrap();
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(summary.ticks < 7);
    assert_eq!(summary.time, SimTime::new(summary.ticks as f64));
}

#[tokio::test]
async fn test_step_advances_one_tick() {
    let simulation = Simulation::new(two_jobs());
    let outcome = simulation.step().await.unwrap();
    assert_eq!(outcome.time, SimTime::ZERO);
    assert!(outcome.ran.is_some());
    assert_eq!(simulation.now().await, SimTime::new(1.0));
}

#[test]
fn test_scenario_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"Scenario(
            name: "from disk",
            policy: SJF,
            resources: [(name: "disk", total: 2)],
            processes: [
                (name: "long", burst: 6.0, max: {{"disk": 2}}, allocation: {{"disk": 1}}),
                (name: "short", arrival: 1.0, burst: 2.0, max: {{"disk": 1}}),
            ],
        )"#
    )
    .unwrap();

    let scenario = Scenario::from_path(file.path()).unwrap();
    let mut sim = scenario.build().unwrap();
    assert!(sim.is_safe_state());

    let metrics = sim.run_to_completion(SimTime::new(50.0)).unwrap().unwrap();
    // short вытесняет long в момент 1 и заканчивает в 3
    let short = sim.registry().iter().find(|p| p.name() == "short").unwrap();
    assert_eq!(short.finish_time(), Some(SimTime::new(3.0)));
    assert_eq!(metrics.makespan, 8.0);
    // Завершенные процессы вернули ресурсы
    assert_eq!(sim.ledger().find_by_name("disk").unwrap().available(), 2);
}
