mod monitor_flow;
mod pool_resilience;
