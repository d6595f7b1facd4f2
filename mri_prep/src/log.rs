use std::time::{Duration, Instant};
use tracing::info;

/// 分阶段累计计时。
///
/// 每个阶段以名称区分，按第一次出现的顺序汇总。
#[derive(Clone, Debug)]
pub struct StageTimer {
    stages: Vec<(&'static str, Duration, usize)>,
    since: Instant,
}

impl StageTimer {
    /// 初始化计时器。初始化时会视为已经调用一次`self.start()`。
    #[inline]
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            since: Instant::now(),
        }
    }

    /// 开始计时。
    #[inline]
    pub fn start(&mut self) {
        self.since = Instant::now();
    }

    /// 结束计时，并将这一区间的时间累计到`stage`上。上一次调用必须是`self.start()`，否则时间计算值无意义。
    pub fn elapsed(&mut self, stage: &'static str) {
        let d = self.since.elapsed();
        match self.stages.iter_mut().find(|(name, _, _)| *name == stage) {
            Some((_, total, count)) => {
                *total += d;
                *count += 1;
            }
            None => self.stages.push((stage, d, 1)),
        }
    }

    /// 计时执行`f`，结果原样返回（包括错误）。
    pub fn time<T>(&mut self, stage: &'static str, f: impl FnOnce() -> T) -> T {
        self.start();
        let out = f();
        self.elapsed(stage);
        out
    }

    /// 某一阶段累计的时间（毫秒）。
    #[inline]
    pub fn get_total_ms(&self, stage: &str) -> u64 {
        self.stages
            .iter()
            .find(|(name, _, _)| *name == stage)
            .map_or(0, |(_, d, _)| d.as_millis() as u64)
    }

    /// 某一阶段被计时的次数。
    #[inline]
    pub fn get_count(&self, stage: &str) -> usize {
        self.stages
            .iter()
            .find(|(name, _, _)| *name == stage)
            .map_or(0, |(_, _, n)| *n)
    }

    /// 以日志输出各阶段耗时。
    pub fn summary(&self) {
        for (stage, total, count) in self.stages.iter() {
            info!(
                stage,
                count,
                total_ms = total.as_millis() as u64,
                "阶段耗时"
            );
        }
    }
}

impl Default for StageTimer {
    fn default() -> Self {
        Self::new()
    }
}
