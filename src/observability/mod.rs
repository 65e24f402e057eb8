//! 可观测性：tracing 订阅者初始化
//!
//! 默认 info，可用 RUST_LOG 覆盖；工具审计日志走 target `tool_audit`，可单独过滤（如 `RUST_LOG=tool_audit=info`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化全局订阅者；重复调用（例如测试中）不会 panic
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
