//! The seven remediation tools.
//!
//! Each returns a structured narrative payload describing the action
//! it performed against the simulated service. None of them touch the
//! metric state; the simulator applies the strategy-level effect after
//! the executor loop finishes.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use evoo_core::types::ToolResult;

use super::{Tool, ToolContext};

pub(crate) fn details_from(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn param_f64(params: &BTreeMap<String, Value>, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn param_u64(params: &BTreeMap<String, Value>, key: &str, default: u64) -> u64 {
    params
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(default)
}

fn param_str<'a>(params: &'a BTreeMap<String, Value>, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub struct RestartService;

#[async_trait]
impl Tool for RestartService {
    fn name(&self) -> &'static str {
        "restart_service"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let service = param_str(params, "service_name", &ctx.service_name);
        log::info!("tool.restart_service service={}", service);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "action": "graceful_restart",
                "pid_old": 12345,
                "pid_new": 12399,
                "uptime_reset": true,
            })),
        )
    }
}

pub struct ScaleHorizontal;

#[async_trait]
impl Tool for ScaleHorizontal {
    fn name(&self) -> &'static str {
        "scale_horizontal"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let target = param_u64(params, "target_instances", 3);
        let service = param_str(params, "service_name", &ctx.service_name);
        log::info!("tool.scale_horizontal service={} target={}", service, target);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "target_instances": target,
                "current_instances": target,
                "scale_direction": if target > 1 { "up" } else { "down" },
                "estimated_ready_seconds": 15,
            })),
        )
    }

    fn default_params(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([("target_instances".to_string(), Value::from(4))])
    }
}

pub struct ScaleVertical;

#[async_trait]
impl Tool for ScaleVertical {
    fn name(&self) -> &'static str {
        "scale_vertical"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let target_cpu = param_f64(params, "target_cpu", 2.0);
        let target_memory = param_f64(params, "target_memory_gb", 4.0);
        let service = param_str(params, "service_name", &ctx.service_name);
        log::info!(
            "tool.scale_vertical service={} cpu={} memory_gb={}",
            service,
            target_cpu,
            target_memory
        );
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "target_cpu_cores": target_cpu,
                "target_memory_gb": target_memory,
                "previous_cpu_cores": 1.0,
                "previous_memory_gb": 2.0,
                "restart_required": true,
            })),
        )
    }

    fn default_params(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("target_cpu".to_string(), Value::from(4.0)),
            ("target_memory_gb".to_string(), Value::from(8.0)),
        ])
    }
}

pub struct ChangeTimeout;

#[async_trait]
impl Tool for ChangeTimeout {
    fn name(&self) -> &'static str {
        "change_timeout"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let new_timeout = param_u64(params, "new_timeout_ms", 15_000);
        let service = param_str(params, "service_name", &ctx.service_name);
        log::info!("tool.change_timeout service={} timeout_ms={}", service, new_timeout);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "new_timeout_ms": new_timeout,
                "previous_timeout_ms": ctx.metrics.timeout_ms,
                "config_reload": true,
            })),
        )
    }

    fn default_params(&self) -> BTreeMap<String, Value> {
        BTreeMap::from([("new_timeout_ms".to_string(), Value::from(15_000))])
    }
}

pub struct RollbackDeployment;

#[async_trait]
impl Tool for RollbackDeployment {
    fn name(&self) -> &'static str {
        "rollback_deployment"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let service = param_str(params, "service_name", &ctx.service_name);
        let target_version = param_str(params, "target_version", "v2.1.3");
        log::info!("tool.rollback_deployment service={}", service);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "rolled_back_to": target_version,
                "rolled_back_from": "v2.2.0",
                "deployment_id": "deploy-abc123",
                "canary_disabled": true,
            })),
        )
    }
}

pub struct ClearCache;

#[async_trait]
impl Tool for ClearCache {
    fn name(&self) -> &'static str {
        "clear_cache"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let service = param_str(params, "service_name", &ctx.service_name);
        let cache_type = param_str(params, "cache_type", "all");
        log::info!("tool.clear_cache service={} cache_type={}", service, cache_type);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "cache_type": cache_type,
                "cleared_entries": 45231,
                "freed_memory_mb": 512,
            })),
        )
    }
}

pub struct RebalanceLoad;

#[async_trait]
impl Tool for RebalanceLoad {
    fn name(&self) -> &'static str {
        "rebalance_load"
    }

    async fn invoke(&self, ctx: &ToolContext, params: &BTreeMap<String, Value>) -> ToolResult {
        let service = param_str(params, "service_name", &ctx.service_name);
        log::info!("tool.rebalance_load service={}", service);
        ToolResult::success(
            self.name(),
            details_from(json!({
                "service": service,
                "algorithm": "least_connections",
                "rebalanced_connections": 1250,
                "overloaded_instances_before": 2,
                "overloaded_instances_after": 0,
            })),
        )
    }
}
