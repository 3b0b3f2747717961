// crates/evoo-core/src/types.rs

//! Core types for the EVOO learning loop
//!
//! This module defines the fundamental data structures shared across the
//! workspace: incident classification, system metrics, remediation
//! strategies, the experience record that drives learning, and the
//! aggregated per-(incident, strategy) statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Classification of a production fault.
///
/// The set is closed: the simulator only samples these six variants and
/// every persisted experience is keyed by one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    ServiceCrash,
    HighLatency,
    CpuSpike,
    MemoryLeak,
    NetworkDegradation,
    TimeoutMisconfiguration,
}

impl IncidentType {
    /// All incident types, in canonical order.
    pub fn all() -> [IncidentType; 6] {
        [
            IncidentType::ServiceCrash,
            IncidentType::HighLatency,
            IncidentType::CpuSpike,
            IncidentType::MemoryLeak,
            IncidentType::NetworkDegradation,
            IncidentType::TimeoutMisconfiguration,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::ServiceCrash => "service_crash",
            IncidentType::HighLatency => "high_latency",
            IncidentType::CpuSpike => "cpu_spike",
            IncidentType::MemoryLeak => "memory_leak",
            IncidentType::NetworkDegradation => "network_degradation",
            IncidentType::TimeoutMisconfiguration => "timeout_misconfiguration",
        }
    }

    /// Human-readable incident description, rendered from the metric
    /// vector observed at detection time.
    pub fn describe(&self, metrics: &SystemMetrics) -> String {
        match self {
            IncidentType::ServiceCrash => format!(
                "Service api-service has crashed. Error rate at {:.0}%, availability {:.0}%.",
                metrics.error_rate * 100.0,
                metrics.availability * 100.0
            ),
            IncidentType::HighLatency => format!(
                "P99 latency spiked to {:.0}ms. CPU at {:.1}%.",
                metrics.latency_ms, metrics.cpu_percent
            ),
            IncidentType::CpuSpike => format!(
                "CPU usage hit {:.1}%. Service is throttling requests.",
                metrics.cpu_percent
            ),
            IncidentType::MemoryLeak => format!(
                "Memory usage at {:.1}%. OOMKiller risk imminent.",
                metrics.memory_percent
            ),
            IncidentType::NetworkDegradation => format!(
                "Network packet loss detected. Latency {:.0}ms, error rate {:.0}%.",
                metrics.latency_ms,
                metrics.error_rate * 100.0
            ),
            IncidentType::TimeoutMisconfiguration => format!(
                "Client timeouts at {}ms causing cascading failures. Error rate {:.0}%.",
                metrics.timeout_ms,
                metrics.error_rate * 100.0
            ),
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentType {
    type Err = crate::error::EvooError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentType::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::error::EvooError::UnknownIncidentType(s.to_string()))
    }
}

/// Incident severity, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Higher weight means more urgent.
    pub fn priority_weight(&self) -> f64 {
        match self {
            Severity::Low => 0.25,
            Severity::Medium => 0.5,
            Severity::High => 0.75,
            Severity::Critical => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named remediation approach the planner can select.
///
/// Seven single-action strategies plus three combined ones. The set is
/// closed; LLM output naming anything else is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    RestartService,
    ScaleHorizontal,
    ScaleVertical,
    ChangeTimeout,
    RollbackDeployment,
    ClearCache,
    RebalanceLoad,
    CombinedRestartScale,
    CombinedCacheRebalance,
    CombinedRollbackScale,
}

impl Strategy {
    /// All strategies, in canonical order.
    pub fn all() -> [Strategy; 10] {
        [
            Strategy::RestartService,
            Strategy::ScaleHorizontal,
            Strategy::ScaleVertical,
            Strategy::ChangeTimeout,
            Strategy::RollbackDeployment,
            Strategy::ClearCache,
            Strategy::RebalanceLoad,
            Strategy::CombinedRestartScale,
            Strategy::CombinedCacheRebalance,
            Strategy::CombinedRollbackScale,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RestartService => "restart_service",
            Strategy::ScaleHorizontal => "scale_horizontal",
            Strategy::ScaleVertical => "scale_vertical",
            Strategy::ChangeTimeout => "change_timeout",
            Strategy::RollbackDeployment => "rollback_deployment",
            Strategy::ClearCache => "clear_cache",
            Strategy::RebalanceLoad => "rebalance_load",
            Strategy::CombinedRestartScale => "combined_restart_scale",
            Strategy::CombinedCacheRebalance => "combined_cache_rebalance",
            Strategy::CombinedRollbackScale => "combined_rollback_scale",
        }
    }

    /// Relative infrastructure cost of carrying out the strategy.
    pub fn estimated_cost(&self) -> f64 {
        match self {
            Strategy::RestartService => 1.0,
            Strategy::ScaleHorizontal => 2.5,
            Strategy::ScaleVertical => 2.0,
            Strategy::ChangeTimeout => 0.5,
            Strategy::RollbackDeployment => 1.5,
            Strategy::ClearCache => 0.3,
            Strategy::RebalanceLoad => 0.8,
            Strategy::CombinedRestartScale => 3.0,
            Strategy::CombinedCacheRebalance => 1.2,
            Strategy::CombinedRollbackScale => 3.5,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = crate::error::EvooError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::error::EvooError::UnknownStrategy(s.to_string()))
    }
}

/// Measurable state of the simulated production service at a point in
/// time. This is the observation vector the planner and evaluator see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// P99 latency in milliseconds
    pub latency_ms: f64,
    /// CPU utilization percentage (0-100)
    pub cpu_percent: f64,
    /// Memory utilization percentage (0-100)
    pub memory_percent: f64,
    /// Error rate (0.0-1.0)
    pub error_rate: f64,
    /// Service availability (0.0-1.0)
    pub availability: f64,
    /// Number of active service instances
    pub active_instances: u32,
    /// Current timeout configuration in milliseconds
    pub timeout_ms: u64,
    /// Time to recover in seconds, when known
    #[serde(default)]
    pub recovery_time_seconds: f64,
    /// When the metrics were collected
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for SystemMetrics {
    fn default() -> Self {
        SystemMetrics::healthy_baseline()
    }
}

impl SystemMetrics {
    /// The steady-state metrics the simulator recovers toward.
    pub fn healthy_baseline() -> Self {
        SystemMetrics {
            latency_ms: 120.0,
            cpu_percent: 25.0,
            memory_percent: 45.0,
            error_rate: 0.005,
            availability: 0.999,
            active_instances: 2,
            timeout_ms: 5000,
            recovery_time_seconds: 0.0,
            timestamp: None,
        }
    }

    /// Weighted health score in [0, 1]; 1.0 is perfectly healthy.
    ///
    /// Latency is normalised against a 5000ms full-scale; the other
    /// components are already fractions.
    pub fn health_score(&self) -> f64 {
        let latency_score = (1.0 - self.latency_ms / 5000.0).clamp(0.0, 1.0);
        let cpu_score = (1.0 - self.cpu_percent / 100.0).clamp(0.0, 1.0);
        let memory_score = (1.0 - self.memory_percent / 100.0).clamp(0.0, 1.0);
        let error_score = (1.0 - self.error_rate).clamp(0.0, 1.0);
        let availability_score = self.availability.clamp(0.0, 1.0);

        latency_score * 0.25
            + cpu_score * 0.15
            + memory_score * 0.15
            + error_score * 0.25
            + availability_score * 0.20
    }

    pub fn is_healthy(&self) -> bool {
        self.availability >= 0.95
            && self.error_rate <= 0.05
            && self.latency_ms < 500.0
            && self.cpu_percent < 80.0
            && self.memory_percent < 85.0
    }

    /// Per-metric deltas relative to an earlier observation. Positive
    /// values mean improvement.
    pub fn improvement_from(&self, before: &SystemMetrics) -> BTreeMap<String, f64> {
        let mut deltas = BTreeMap::new();
        deltas.insert("latency_improvement".to_string(), before.latency_ms - self.latency_ms);
        deltas.insert("cpu_improvement".to_string(), before.cpu_percent - self.cpu_percent);
        deltas.insert(
            "memory_improvement".to_string(),
            before.memory_percent - self.memory_percent,
        );
        deltas.insert(
            "error_rate_improvement".to_string(),
            before.error_rate - self.error_rate,
        );
        deltas.insert(
            "availability_improvement".to_string(),
            self.availability - before.availability,
        );
        deltas
    }
}

/// A detected production incident.
///
/// `metrics_at_detection` is immutable once recorded; the simulator
/// never rewrites it after generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub affected_service: String,
    pub metrics_at_detection: SystemMetrics,
    pub detected_at: DateTime<Utc>,
    pub description: String,
}

impl Incident {
    /// Brief one-line summary for logs.
    pub fn summary(&self) -> String {
        let m = &self.metrics_at_detection;
        format!(
            "[{}] {}: latency={:.0}ms, error_rate={:.1}%, availability={:.1}%",
            self.severity.as_str().to_uppercase(),
            self.incident_type,
            m.latency_ms,
            m.error_rate * 100.0,
            m.availability * 100.0
        )
    }
}

/// Execution status of a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Skipped,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Success => f.write_str("success"),
            ToolStatus::Error => f.write_str("error"),
            ToolStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// Uniform result shape shared by every tool in the catalog.
///
/// Tool-specific payload fields live in the flattened `details` map so
/// the serialized form is a single flat object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub status: ToolStatus,
    pub executed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn success(tool: &str, details: serde_json::Map<String, serde_json::Value>) -> Self {
        ToolResult {
            tool: tool.to_string(),
            status: ToolStatus::Success,
            executed_at: Utc::now(),
            details,
        }
    }

    pub fn error(tool: &str, message: impl Into<String>) -> Self {
        let mut details = serde_json::Map::new();
        details.insert("error".to_string(), serde_json::Value::String(message.into()));
        ToolResult {
            tool: tool.to_string(),
            status: ToolStatus::Error,
            executed_at: Utc::now(),
            details,
        }
    }

    /// Result recorded when a guardrail blocked the invocation. The
    /// rule name lands in the trace so a reviewer can see what fired.
    pub fn skipped(tool: &str, rule_name: &str, reason: &str) -> Self {
        let mut details = serde_json::Map::new();
        details.insert(
            "blocked_by".to_string(),
            serde_json::Value::String(rule_name.to_string()),
        );
        details.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
        ToolResult {
            tool: tool.to_string(),
            status: ToolStatus::Skipped,
            executed_at: Utc::now(),
            details,
        }
    }
}

/// Qualitative verdict from the LLM judge (or its heuristic fallback).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Excellent,
    Good,
    Adequate,
    Poor,
    Failed,
    #[default]
    Unknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Excellent => "excellent",
            Verdict::Good => "good",
            Verdict::Adequate => "adequate",
            Verdict::Poor => "poor",
            Verdict::Failed => "failed",
            Verdict::Unknown => "unknown",
        }
    }

    /// Tolerant parse for LLM output; anything unrecognised maps to
    /// `Unknown` rather than failing the run.
    pub fn parse_lenient(s: &str) -> Verdict {
        match s.trim().to_lowercase().as_str() {
            "excellent" => Verdict::Excellent,
            "good" => Verdict::Good,
            "adequate" => Verdict::Adequate,
            "poor" => Verdict::Poor,
            "failed" => Verdict::Failed,
            _ => Verdict::Unknown,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The immutable unit of learning: one full (incident, strategy,
/// outcome) cycle. Created once by the evaluator and append-only from
/// then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub run_index: u32,
    pub incident_type: IncidentType,
    pub incident_severity: Severity,
    pub metrics_before: SystemMetrics,
    pub strategy_used: Strategy,
    pub tools_called: Vec<String>,
    pub tool_results: Vec<ToolResult>,
    pub metrics_after: SystemMetrics,
    pub recovery_time_seconds: f64,
    pub service_restored: bool,
    pub infrastructure_cost: f64,
    pub reward: f64,
    pub reward_breakdown: BTreeMap<String, f64>,
    pub llm_verdict: Verdict,
    pub llm_analysis: String,
    pub success: bool,
}

/// Aggregated statistics for one (incident type, strategy) pair.
///
/// Invariants preserved by [`StrategyRecord::update`]:
/// `total_uses == success_count + failure_count`,
/// `average_reward == total_reward / total_uses` and
/// `success_rate == success_count / total_uses` when `total_uses > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub incident_type: IncidentType,
    pub strategy: Strategy,
    pub total_uses: u64,
    pub total_reward: f64,
    pub total_recovery_time: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub average_reward: f64,
    pub average_recovery_time: f64,
    pub success_rate: f64,
    pub first_used: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
}

impl StrategyRecord {
    pub fn new(incident_type: IncidentType, strategy: Strategy) -> Self {
        StrategyRecord {
            incident_type,
            strategy,
            total_uses: 0,
            total_reward: 0.0,
            total_recovery_time: 0.0,
            success_count: 0,
            failure_count: 0,
            average_reward: 0.0,
            average_recovery_time: 0.0,
            success_rate: 0.0,
            first_used: None,
            last_used: None,
        }
    }

    /// Fold one remediation outcome into the record.
    pub fn update(&mut self, reward: f64, recovery_time: f64, success: bool) {
        let now = Utc::now();
        self.total_uses += 1;
        self.total_reward += reward;
        self.total_recovery_time += recovery_time;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        let uses = self.total_uses as f64;
        self.average_reward = round3(self.total_reward / uses);
        self.average_recovery_time = round3(self.total_recovery_time / uses);
        self.success_rate = round3(self.success_count as f64 / uses);
        if self.first_used.is_none() {
            self.first_used = Some(now);
        }
        self.last_used = Some(now);
    }
}

/// The remediation plan produced by the planner for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub strategy: Strategy,
    pub tool_sequence: Vec<String>,
    pub tool_parameters: BTreeMap<String, serde_json::Value>,
    pub reasoning: String,
    pub is_exploratory: bool,
    pub llm_selected: bool,
}

/// Per-run observation tuple surfaced to the host process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_index: u32,
    pub incident_type: IncidentType,
    pub strategy: Strategy,
    pub is_exploratory: bool,
    pub service_restored: bool,
    pub reward: f64,
    pub recovery_time_seconds: f64,
    pub llm_verdict: Verdict,
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn round4(v: f64) -> f64 {
    (v * 10000.0).round() / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_type_round_trip() {
        for t in IncidentType::all() {
            let json = serde_json::to_string(&t).unwrap();
            let back: IncidentType = serde_json::from_str(&json).unwrap();
            assert_eq!(t, back);
            assert_eq!(t, t.as_str().parse().unwrap());
        }
        assert!("disk_full".parse::<IncidentType>().is_err());
    }

    #[test]
    fn test_strategy_set_is_closed() {
        assert_eq!(Strategy::all().len(), 10);
        for s in Strategy::all() {
            assert_eq!(s, s.as_str().parse().unwrap());
            let cost = s.estimated_cost();
            assert!((0.05..=3.5).contains(&cost));
        }
        assert!("reboot_everything".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::Critical.priority_weight() > Severity::Low.priority_weight());
    }

    #[test]
    fn test_health_score_bounds() {
        let healthy = SystemMetrics::healthy_baseline();
        let score = healthy.health_score();
        assert!(score > 0.8 && score <= 1.0);
        assert!(healthy.is_healthy());

        let crashed = SystemMetrics {
            latency_ms: 12000.0,
            cpu_percent: 15.0,
            memory_percent: 20.0,
            error_rate: 0.95,
            availability: 0.05,
            ..SystemMetrics::healthy_baseline()
        };
        let score = crashed.health_score();
        assert!((0.0..=1.0).contains(&score));
        assert!(score < 0.4);
        assert!(!crashed.is_healthy());
    }

    #[test]
    fn test_strategy_record_invariants() {
        let mut record = StrategyRecord::new(IncidentType::ServiceCrash, Strategy::RestartService);
        record.update(80.0, 20.0, true);
        record.update(-50.0, 90.0, false);
        record.update(60.0, 30.0, true);

        assert_eq!(record.total_uses, 3);
        assert_eq!(record.success_count + record.failure_count, record.total_uses);
        assert!((record.average_reward - round3(90.0 / 3.0)).abs() < 1e-9);
        assert!((record.success_rate - round3(2.0 / 3.0)).abs() < 1e-9);
        assert!(record.first_used.is_some());
        assert!(record.last_used >= record.first_used);
    }

    #[test]
    fn test_experience_serde_round_trip() {
        let exp = Experience {
            id: "abc12345".to_string(),
            timestamp: Utc::now(),
            run_index: 3,
            incident_type: IncidentType::MemoryLeak,
            incident_severity: Severity::High,
            metrics_before: SystemMetrics::healthy_baseline(),
            strategy_used: Strategy::ClearCache,
            tools_called: vec!["clear_cache".to_string(), "query_metrics".to_string()],
            tool_results: vec![ToolResult::success("clear_cache", serde_json::Map::new())],
            metrics_after: SystemMetrics::healthy_baseline(),
            recovery_time_seconds: 12.5,
            service_restored: true,
            infrastructure_cost: 1.0,
            reward: 88.25,
            reward_breakdown: BTreeMap::from([("service_restored".to_string(), 100.0)]),
            llm_verdict: Verdict::Good,
            llm_analysis: "Cache clear recovered the service quickly.".to_string(),
            success: true,
        };

        let json = serde_json::to_string(&exp).unwrap();
        let back: Experience = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, exp.id);
        assert_eq!(back.strategy_used, exp.strategy_used);
        assert_eq!(back.reward_breakdown, exp.reward_breakdown);
        assert_eq!(back.tool_results[0].tool, "clear_cache");
        assert_eq!(back.success, back.service_restored);
    }

    #[test]
    fn test_tool_result_skipped_carries_rule_name() {
        let result = ToolResult::skipped("restart_service", "min_instances_for_restart", "only 1 instance");
        assert_eq!(result.status, ToolStatus::Skipped);
        assert_eq!(
            result.details.get("blocked_by").and_then(|v| v.as_str()),
            Some("min_instances_for_restart")
        );
    }

    #[test]
    fn test_verdict_lenient_parse() {
        assert_eq!(Verdict::parse_lenient("Excellent"), Verdict::Excellent);
        assert_eq!(Verdict::parse_lenient("  good "), Verdict::Good);
        assert_eq!(Verdict::parse_lenient("stellar"), Verdict::Unknown);
    }
}
