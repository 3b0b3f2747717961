//! Remediation and analysis tool catalog.
//!
//! Every tool implements the [`Tool`] capability and returns the
//! uniform [`ToolResult`] shape. Remediation tools are narrative
//! stubs: they report what the action would have done but never mutate
//! the environment directly; the strategy-level simulator effect is
//! the only environmental mutator.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use evoo_core::types::{IncidentType, SystemMetrics, ToolResult};
use evoo_engines::LlmClient;

pub mod analysis;
pub mod remediation;

pub use analysis::{AnalyzeLogs, PredictIncidentType, QueryMetrics};
pub use remediation::{
    ChangeTimeout, ClearCache, RebalanceLoad, RestartService, RollbackDeployment, ScaleHorizontal,
    ScaleVertical,
};

/// Tool descriptions included in the executor's system prompt.
pub const TOOL_CATALOG_PROMPT: &str = "Available SRE remediation tools:
1. analyze_logs(service_name, incident_type) - Analyze recent logs for root cause patterns
2. restart_service(service_name) - Gracefully restart the affected service
3. scale_horizontal(target_instances, service_name) - Scale to N instances horizontally
4. scale_vertical(target_cpu, target_memory_gb, service_name) - Increase CPU/memory limits
5. change_timeout(new_timeout_ms, service_name) - Update timeout configuration
6. rollback_deployment(service_name) - Rollback to previous stable deployment
7. clear_cache(service_name, cache_type) - Clear service cache to free memory
8. rebalance_load(service_name) - Rebalance traffic across available instances
9. query_metrics(service_name) - Query current system metrics from observability stack
10. predict_incident_type(service_name) - Classify the incident from current metrics
11. finish() - Remediation complete, proceed to evaluation";

/// Names the executor accepts from LLM output. `finish` is the loop
/// terminator, not a registered tool.
pub const VALID_TOOL_NAMES: [&str; 11] = [
    "analyze_logs",
    "restart_service",
    "scale_horizontal",
    "scale_vertical",
    "change_timeout",
    "rollback_deployment",
    "clear_cache",
    "rebalance_load",
    "query_metrics",
    "predict_incident_type",
    "finish",
];

/// Environment a tool sees when invoked.
#[derive(Clone)]
pub struct ToolContext {
    pub service_name: String,
    pub incident_type: IncidentType,
    pub metrics: SystemMetrics,
    pub llm: Option<Arc<LlmClient>>,
}

/// An atomic action the executor can dispatch.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the tool. Failures are reported through the result's
    /// `status`, never as panics or errors.
    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult;

    fn default_params(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

/// Registered map from tool name to handler.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Registry with the full ten-tool catalog installed.
    pub fn with_standard_tools() -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(RestartService));
        registry.register(Arc::new(ScaleHorizontal));
        registry.register(Arc::new(ScaleVertical));
        registry.register(Arc::new(ChangeTimeout));
        registry.register(Arc::new(RollbackDeployment));
        registry.register(Arc::new(ClearCache));
        registry.register(Arc::new(RebalanceLoad));
        registry.register(Arc::new(QueryMetrics));
        registry.register(Arc::new(AnalyzeLogs));
        registry.register(Arc::new(PredictIncidentType));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn default_params_for(&self, name: &str) -> BTreeMap<String, Value> {
        self.tools
            .get(name)
            .map(|tool| tool.default_params())
            .unwrap_or_default()
    }

    /// Dispatch by name. An unknown tool yields an error-status result
    /// rather than failing the loop.
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ToolContext,
        params: &BTreeMap<String, Value>,
    ) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(ctx, params).await,
            None => ToolResult::error(name, format!("Unknown tool: {name}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_standard_tools()
    }
}

/// Relative cost charged against the incident's cost budget when a
/// tool actually executes. Analysis tools are free.
pub fn action_cost(tool: &str, params: &BTreeMap<String, Value>) -> f64 {
    match tool {
        "restart_service" => 0.1,
        "scale_horizontal" => {
            let target = params
                .get("target_instances")
                .and_then(Value::as_f64)
                .unwrap_or(3.0);
            2.0 * target / 2.0
        }
        "scale_vertical" => {
            let cpu = params.get("target_cpu").and_then(Value::as_f64).unwrap_or(2.0);
            let memory = params
                .get("target_memory_gb")
                .and_then(Value::as_f64)
                .unwrap_or(4.0);
            1.5 * (cpu + memory) / 4.0
        }
        "change_timeout" => 0.05,
        "rollback_deployment" => 0.5,
        "clear_cache" => 0.1,
        "rebalance_load" => 0.3,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evoo_core::types::ToolStatus;

    fn context() -> ToolContext {
        ToolContext {
            service_name: "api-service".to_string(),
            incident_type: IncidentType::ServiceCrash,
            metrics: SystemMetrics::healthy_baseline(),
            llm: None,
        }
    }

    #[tokio::test]
    async fn test_standard_registry_covers_catalog() {
        let registry = ToolRegistry::with_standard_tools();
        for name in [
            "restart_service",
            "scale_horizontal",
            "scale_vertical",
            "change_timeout",
            "rollback_deployment",
            "clear_cache",
            "rebalance_load",
            "query_metrics",
            "analyze_logs",
            "predict_incident_type",
        ] {
            assert!(registry.contains(name), "missing tool {name}");
        }
        assert_eq!(registry.names().len(), 10);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let registry = ToolRegistry::with_standard_tools();
        let result = registry.invoke("format_disk", &context(), &BTreeMap::new()).await;
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.details["error"].as_str().unwrap().contains("Unknown tool"));
    }

    #[test]
    fn test_action_costs_scale_with_parameters() {
        let params = BTreeMap::from([("target_instances".to_string(), Value::from(8))]);
        assert!((action_cost("scale_horizontal", &params) - 8.0).abs() < 1e-9);

        let params = BTreeMap::from([
            ("target_cpu".to_string(), Value::from(4.0)),
            ("target_memory_gb".to_string(), Value::from(8.0)),
        ]);
        assert!((action_cost("scale_vertical", &params) - 4.5).abs() < 1e-9);

        assert_eq!(action_cost("query_metrics", &BTreeMap::new()), 0.0);
        assert!((action_cost("change_timeout", &BTreeMap::new()) - 0.05).abs() < 1e-9);
    }
}
