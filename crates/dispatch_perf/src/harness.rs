//! Benchmark workloads run against a freshly built bus.
//!
//! Every scenario checks its delivery count as well as timing it, so a run
//! doubles as a smoke test of the dispatch core.

use crate::config::{AppConfig, WorkloadSettings};
use anyhow::ensure;
use horizon_dispatch::{
    define_event, DispatchSettings, EventBus, Priority, Subscriber, SubscriberBinder,
    SubscriptionHandle,
};
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

define_event! {
    /// Payload published by every scenario; cloning it never allocates.
    PerfEvent { sequence: u64 }
}

/// A subscriber that counts what it receives into a shared tally.
pub struct PerfSubscriber {
    received: Cell<u64>,
    tally: Rc<Cell<u64>>,
}

impl PerfSubscriber {
    pub fn new(tally: Rc<Cell<u64>>) -> Rc<Self> {
        Rc::new(Self {
            received: Cell::new(0),
            tally,
        })
    }

    pub fn received(&self) -> u64 {
        self.received.get()
    }

    fn record(&self) {
        self.received.set(self.received.get() + 1);
        self.tally.set(self.tally.get() + 1);
    }

    fn on_event(&self, _event: &PerfEvent, _bus: &EventBus) {
        self.record();
    }
}

impl Subscriber for PerfSubscriber {
    fn bind(binder: &mut SubscriberBinder<'_, Self>) -> horizon_dispatch::Result<()> {
        binder
            .on(Priority::Medium, Self::on_event)?
            .on_async(Priority::Medium, |s: Rc<Self>, _: PerfEvent, _: EventBus| async move {
                s.record();
            })?;
        Ok(())
    }
}

/// Timing and delivery figures for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub operations: u64,
    pub deliveries: u64,
    pub elapsed_micros: u128,
}

impl ScenarioReport {
    fn new(name: &'static str, operations: u64, deliveries: u64, elapsed: Duration) -> Self {
        let report = Self {
            name,
            operations,
            deliveries,
            elapsed_micros: elapsed.as_micros(),
        };
        info!(
            "📊 {}: {} operations, {} deliveries in {:?}",
            name, operations, deliveries, elapsed
        );
        report
    }
}

/// Config pool figures before and after a sustained publish loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationReport {
    pub publishes: u64,
    pub configs_before: usize,
    pub configs_after: usize,
}

impl AllocationReport {
    /// True when no publish config was created after warm-up.
    pub fn is_steady(&self) -> bool {
        self.configs_after == self.configs_before
    }
}

/// Everything a full run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessReport {
    pub scenarios: Vec<ScenarioReport>,
    pub allocation: AllocationReport,
}

/// Builds a bus carrying only the harness subscriber's bindings.
pub fn build_bus(settings: &DispatchSettings) -> horizon_dispatch::Result<EventBus> {
    EventBus::builder()
        .subscriber::<PerfSubscriber>()?
        .build_with(settings.clone())
}

/// Runs every scenario in sequence, each on its own bus.
pub async fn run_all(config: &AppConfig) -> anyhow::Result<HarnessReport> {
    let workload = &config.workload;
    let mut scenarios = Vec::with_capacity(5);

    scenarios.push(subscribe_churn(&build_bus(&config.dispatch)?, workload)?);
    scenarios.push(single_subscriber(&build_bus(&config.dispatch)?, workload)?);
    scenarios.push(many_subscribers(&build_bus(&config.dispatch)?, workload)?);
    let allocation = pool_allocation(&build_bus(&config.dispatch)?, workload)?;
    scenarios.push(async_publishing(&build_bus(&config.dispatch)?, workload).await?);

    if !allocation.is_steady() {
        warn!(
            "⚠️ Publish configs grew from {} to {} during the allocation check",
            allocation.configs_before, allocation.configs_after
        );
    }

    Ok(HarnessReport {
        scenarios,
        allocation,
    })
}

/// Subscribes and unsubscribes a batch of instances, over and over.
pub fn subscribe_churn(bus: &EventBus, workload: &WorkloadSettings) -> anyhow::Result<ScenarioReport> {
    let tally = Rc::new(Cell::new(0));
    let subscribers: Vec<_> = (0..workload.subscriber_count)
        .map(|_| PerfSubscriber::new(tally.clone()))
        .collect();

    let start = Instant::now();
    for _ in 0..workload.churn_rounds {
        let handles: Vec<SubscriptionHandle> = subscribers
            .iter()
            .map(|subscriber| bus.start_listening(subscriber))
            .collect();
        drop(handles);
    }
    let elapsed = start.elapsed();

    ensure!(
        bus.subscriber_count::<PerfEvent>()? == 0,
        "subscribers still attached after churn"
    );

    let operations = (workload.churn_rounds * workload.subscriber_count * 2) as u64;
    Ok(ScenarioReport::new("subscribe_churn", operations, 0, elapsed))
}

/// Publishes repeatedly to a single listener.
pub fn single_subscriber(bus: &EventBus, workload: &WorkloadSettings) -> anyhow::Result<ScenarioReport> {
    let tally = Rc::new(Cell::new(0));
    let subscriber = PerfSubscriber::new(tally.clone());
    let _handle = bus.start_listening(&subscriber);

    let start = Instant::now();
    for sequence in 0..workload.publish_count as u64 {
        bus.publish(PerfEvent { sequence })?;
    }
    let elapsed = start.elapsed();

    let expected = workload.publish_count as u64;
    ensure!(
        subscriber.received() == expected,
        "expected {} deliveries, got {}",
        expected,
        subscriber.received()
    );

    Ok(ScenarioReport::new(
        "single_subscriber",
        expected,
        tally.get(),
        elapsed,
    ))
}

/// Publishes repeatedly to every configured subscriber.
pub fn many_subscribers(bus: &EventBus, workload: &WorkloadSettings) -> anyhow::Result<ScenarioReport> {
    let tally = Rc::new(Cell::new(0));
    let subscribers: Vec<_> = (0..workload.subscriber_count)
        .map(|_| PerfSubscriber::new(tally.clone()))
        .collect();
    let _handles: Vec<_> = subscribers.iter().map(|s| bus.start_listening(s)).collect();

    let start = Instant::now();
    for sequence in 0..workload.publish_count as u64 {
        bus.publish(PerfEvent { sequence })?;
    }
    let elapsed = start.elapsed();

    let expected = (workload.subscriber_count * workload.publish_count) as u64;
    ensure!(
        tally.get() == expected,
        "expected {} deliveries, got {}",
        expected,
        tally.get()
    );

    Ok(ScenarioReport::new(
        "many_subscribers",
        workload.publish_count as u64,
        tally.get(),
        elapsed,
    ))
}

/// Mixes plain, cancelable and filtered publishes and reports whether the
/// config pool had to create anything after warm-up.
pub fn pool_allocation(bus: &EventBus, workload: &WorkloadSettings) -> anyhow::Result<AllocationReport> {
    let tally = Rc::new(Cell::new(0));
    let kept = PerfSubscriber::new(tally.clone());
    let skipped = PerfSubscriber::new(tally.clone());
    let _kept = bus.start_listening(&kept);
    let _skipped = bus.start_listening(&skipped);

    bus.publish(PerfEvent { sequence: 0 })?;
    bus.emit(PerfEvent { sequence: 0 })
        .cancelable()
        .exclude_instance(&skipped)?
        .publish()?;
    let configs_before = bus.pool_stats::<PerfEvent>()?.created;

    for sequence in 0..workload.publish_count as u64 {
        match sequence % 3 {
            0 => bus.publish(PerfEvent { sequence })?,
            1 => bus.emit(PerfEvent { sequence }).cancelable().publish()?,
            _ => bus
                .emit(PerfEvent { sequence })
                .exclude_instance(&skipped)?
                .publish()?,
        };
    }

    let report = AllocationReport {
        publishes: workload.publish_count as u64,
        configs_before,
        configs_after: bus.pool_stats::<PerfEvent>()?.created,
    };
    info!(
        "📊 pool_allocation: {} publishes, configs created {} -> {}",
        report.publishes, report.configs_before, report.configs_after
    );
    Ok(report)
}

/// Publishes asynchronously to every configured subscriber.
pub async fn async_publishing(
    bus: &EventBus,
    workload: &WorkloadSettings,
) -> anyhow::Result<ScenarioReport> {
    let tally = Rc::new(Cell::new(0));
    let subscribers: Vec<_> = (0..workload.subscriber_count)
        .map(|_| PerfSubscriber::new(tally.clone()))
        .collect();
    let _handles: Vec<_> = subscribers.iter().map(|s| bus.start_listening(s)).collect();

    let start = Instant::now();
    for sequence in 0..workload.publish_count as u64 {
        bus.publish_async(PerfEvent { sequence }).await?;
    }
    let elapsed = start.elapsed();

    let expected = (workload.subscriber_count * workload.publish_count) as u64;
    ensure!(
        tally.get() == expected,
        "expected {} async deliveries, got {}",
        expected,
        tally.get()
    );

    Ok(ScenarioReport::new(
        "async_publishing",
        workload.publish_count as u64,
        tally.get(),
        elapsed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_workload() -> WorkloadSettings {
        WorkloadSettings {
            subscriber_count: 5,
            publish_count: 40,
            churn_rounds: 3,
        }
    }

    fn bus() -> EventBus {
        build_bus(&DispatchSettings::default()).unwrap()
    }

    #[test]
    fn churn_leaves_no_listeners() {
        let report = subscribe_churn(&bus(), &small_workload()).unwrap();
        assert_eq!(report.operations, 30);
        assert_eq!(report.deliveries, 0);
    }

    #[test]
    fn single_subscriber_receives_every_publish() {
        let report = single_subscriber(&bus(), &small_workload()).unwrap();
        assert_eq!(report.deliveries, 40);
    }

    #[test]
    fn fan_out_reaches_every_subscriber() {
        let report = many_subscribers(&bus(), &small_workload()).unwrap();
        assert_eq!(report.operations, 40);
        assert_eq!(report.deliveries, 200);
    }

    #[test_log::test]
    fn pool_stays_flat_after_warm_up() {
        let report = pool_allocation(&bus(), &small_workload()).unwrap();
        assert!(report.is_steady(), "{report:?}");
        assert!(report.configs_before > 0);
    }

    #[test]
    fn preallocated_pool_never_grows() {
        let settings = DispatchSettings {
            pool_capacity: 4,
            preallocate: 4,
            ..DispatchSettings::default()
        };
        let bus = build_bus(&settings).unwrap();
        let report = pool_allocation(&bus, &small_workload()).unwrap();
        assert!(report.is_steady());
    }

    #[tokio::test]
    async fn async_publishing_awaits_every_handler() {
        let report = async_publishing(&bus(), &small_workload()).await.unwrap();
        assert_eq!(report.deliveries, 200);
    }

    #[test_log::test(tokio::test)]
    async fn full_run_produces_a_report_per_scenario() {
        let config = AppConfig {
            workload: small_workload(),
            ..AppConfig::default()
        };
        let report = run_all(&config).await.unwrap();
        let names: Vec<_> = report.scenarios.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            [
                "subscribe_churn",
                "single_subscriber",
                "many_subscribers",
                "async_publishing"
            ]
        );
        assert!(report.allocation.is_steady());
    }
}
