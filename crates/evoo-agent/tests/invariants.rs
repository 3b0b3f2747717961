//! Property-based invariants over the stores, the simulator, and the
//! reward function.

use proptest::prelude::*;
use std::collections::BTreeMap;

use evoo_agent::evaluator::{compute_reward, RewardInputs};
use evoo_agent::simulator::{recover_metrics, ProductionSimulator};
use evoo_core::types::Strategy as RemediationStrategy;
use evoo_core::types::{IncidentType, StrategyRecord, SystemMetrics};

fn any_incident_type() -> impl proptest::strategy::Strategy<Value = IncidentType> {
    prop::sample::select(IncidentType::all().to_vec())
}

fn any_strategy() -> impl proptest::strategy::Strategy<Value = RemediationStrategy> {
    prop::sample::select(RemediationStrategy::all().to_vec())
}

fn any_metrics() -> impl proptest::strategy::Strategy<Value = SystemMetrics> {
    (
        0.0f64..20_000.0,
        0.0f64..=100.0,
        0.0f64..=100.0,
        0.0f64..=1.0,
        0.0f64..=1.0,
        1u32..=10,
    )
        .prop_map(
            |(latency_ms, cpu_percent, memory_percent, error_rate, availability, instances)| {
                SystemMetrics {
                    latency_ms,
                    cpu_percent,
                    memory_percent,
                    error_rate,
                    availability,
                    active_instances: instances,
                    ..SystemMetrics::healthy_baseline()
                }
            },
        )
}

proptest! {
    /// Counter invariants hold under any update sequence.
    #[test]
    fn strategy_record_counters_stay_consistent(
        outcomes in prop::collection::vec(
            ((-150.0f64..250.0), (0.0f64..300.0), any::<bool>()),
            1..40,
        )
    ) {
        let mut record = StrategyRecord::new(IncidentType::CpuSpike, RemediationStrategy::ScaleVertical);
        for (reward, recovery, success) in &outcomes {
            record.update(*reward, *recovery, *success);
        }

        prop_assert_eq!(record.total_uses, outcomes.len() as u64);
        prop_assert_eq!(record.total_uses, record.success_count + record.failure_count);
        prop_assert!((0.0..=1.0).contains(&record.success_rate));

        let expected_avg = record.total_reward / record.total_uses as f64;
        prop_assert!((record.average_reward - expected_avg).abs() < 0.001);
        let expected_rate = record.success_count as f64 / record.total_uses as f64;
        prop_assert!((record.success_rate - expected_rate).abs() < 0.001);
    }

    /// Every sampled incident respects the metric bounds.
    #[test]
    fn generated_metrics_are_in_bounds(seed in any::<u64>(), runs in 1u32..8) {
        let mut sim = ProductionSimulator::new(Some(seed));
        for run in 0..runs {
            let incident = sim.generate_incident(run);
            let m = &incident.metrics_at_detection;
            prop_assert!((0.0..=100.0).contains(&m.cpu_percent));
            prop_assert!((0.0..=100.0).contains(&m.memory_percent));
            prop_assert!((0.0..=1.0).contains(&m.error_rate));
            prop_assert!((0.0..=1.0).contains(&m.availability));
            prop_assert!(m.latency_ms >= 0.0);
            prop_assert!(m.active_instances >= 1);
            prop_assert!((0.0..=1.0).contains(&m.health_score()));
        }
    }

    /// The restore predicate is exactly the availability/error-rate
    /// conjunction, and post-metrics stay in bounds.
    #[test]
    fn applied_strategy_outcome_is_consistent(
        seed in any::<u64>(),
        incident_type in any_incident_type(),
        strategy in any_strategy(),
    ) {
        let mut sim = ProductionSimulator::new(Some(seed));
        let incident = sim.generate_incident_of(incident_type, 0);
        let outcome = sim.apply_strategy(&incident, strategy, &BTreeMap::new());

        let m = &outcome.metrics_after;
        prop_assert_eq!(
            outcome.service_restored,
            m.availability >= 0.95 && m.error_rate <= 0.05
        );
        prop_assert!((0.0..=100.0).contains(&m.cpu_percent));
        prop_assert!((0.0..=1.0).contains(&m.error_rate));
        prop_assert!((0.0..=1.0).contains(&m.availability));
        prop_assert!((0.0..=1.0).contains(&outcome.effectiveness));
        prop_assert!(outcome.recovery_time_seconds >= 0.0);
        prop_assert!(outcome.infrastructure_cost >= 1.0);
    }

    /// The reward breakdown always reconciles to the scalar.
    #[test]
    fn reward_breakdown_reconciles(
        before in any_metrics(),
        after in any_metrics(),
        recovery in 0.0f64..300.0,
        restored in any::<bool>(),
        cost in 0.0f64..20.0,
        strategy in any_strategy(),
        incident_type in any_incident_type(),
    ) {
        let inputs = RewardInputs {
            metrics_before: &before,
            metrics_after: &after,
            recovery_time_seconds: recovery,
            service_restored: restored,
            infrastructure_cost: cost,
            strategy,
            incident_type,
        };
        let outcome = compute_reward(&inputs);
        let sum: f64 = outcome.breakdown.values().sum();
        prop_assert!((sum - outcome.reward).abs() < 1e-9);

        // The restoration component always matches the flag.
        if restored {
            prop_assert_eq!(outcome.breakdown.get("service_restored"), Some(&100.0));
        } else {
            prop_assert_eq!(outcome.breakdown.get("service_not_restored"), Some(&-50.0));
        }
    }

    /// Zero-effectiveness recovery is idempotent.
    #[test]
    fn zero_effect_recovery_is_idempotent(before in any_metrics()) {
        let once = recover_metrics(&before, 0.0);
        let twice = recover_metrics(&once, 0.0);
        prop_assert_eq!(once, twice);
    }
}
