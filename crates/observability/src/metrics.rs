//! 转发指标记录
//!
//! Prometheus 计数器与仪表。未安装 recorder 时调用是空操作。

use metrics::{counter, gauge};

/// 记录一行日志被投递给某个 sink
pub fn record_line_relayed(sink: &str) {
    counter!(
        "trpg_relay_lines_relayed_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// 记录一次 transport 调用结果
///
/// `op`: `create` / `edit` / `send` / `live` (create 或 edit 失败) / `panic`
pub fn record_delivery(sink: &str, op: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "trpg_relay_deliveries_total",
        "sink" => sink.to_string(),
        "op" => op,
        "status" => status
    )
    .increment(1);
}

/// 记录 live 消息滚动
pub fn record_live_rollover(sink: &str) {
    counter!(
        "trpg_relay_live_rollovers_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// 记录队列溢出丢弃
pub fn record_queue_drop(policy: &'static str) {
    counter!("trpg_relay_lines_dropped_total", "policy" => policy).increment(1);
}

/// 记录队列当前深度
pub fn record_queue_depth(depth: usize) {
    gauge!("trpg_relay_queue_depth").set(depth as f64);
}

/// 记录转发主循环的瞬时故障
pub fn record_loop_failure() {
    counter!("trpg_relay_loop_failures_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_line_relayed("global");
        record_delivery("tenant:1", "edit", true);
        record_queue_drop("drop_oldest");
        record_queue_depth(3);
    }
}
