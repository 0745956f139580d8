//! 输出管道指标
//!
//! 基于 `metrics` facade 的记录函数，以及用于批大小 / flush 耗时分布的在线统计。

use metrics::{counter, gauge, histogram};

/// 记录一次 flush 请求
///
/// `trigger` 取值：`capacity`、`interval`、`shutdown`。
pub fn record_flush_requested(trigger: &'static str) {
    counter!("outflow_flushes_requested_total", "trigger" => trigger).increment(1);
}

/// 记录一次完成的 flush (所有 output 均已尝试，offset 已提交)
pub fn record_flush_completed(batch_size: usize, batch_weight: usize, duration_ms: f64) {
    counter!("outflow_flushes_completed_total").increment(1);
    counter!("outflow_events_flushed_total").increment(batch_size as u64);
    histogram!("outflow_batch_size").record(batch_size as f64);
    histogram!("outflow_batch_weight").record(batch_weight as f64);
    histogram!("outflow_flush_duration_ms").record(duration_ms);
}

/// 记录一次 output 投递
pub fn record_output_delivery(output: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "outflow_output_deliveries_total",
        "output" => output.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录 flush 后提交的 journal offset
pub fn record_offset_committed(offset: u64) {
    gauge!("outflow_committed_offset").set(offset as f64);
}

/// 记录路由缓存查询
pub fn record_route_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("outflow_route_cache_lookups_total", "result" => result).increment(1);
}

/// 记录 output 实例化失败
pub fn record_output_instantiation_failure(output_id: &str) {
    counter!(
        "outflow_output_instantiation_failures_total",
        "output" => output_id.to_string()
    )
    .increment(1);
}

/// 记录因超出 shutdown 预算而放弃的最终 flush
pub fn record_shutdown_timeout() {
    counter!("outflow_shutdown_timeouts_total").increment(1);
}

/// 记录当前缓冲区权重
pub fn record_buffer_weight(weight: usize) {
    gauge!("outflow_buffer_weight").set(weight as f64);
}

/// 统计摘要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计 (Welford 算法)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加样本
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
