//! 시스템 부하 샘플링 포트.
//!
//! 구현: `ondemand-collect` crate (sysinfo)

use std::time::Duration;

/// CPU 부하 샘플
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuLoadSample {
    /// 측정 구간 CPU 사용률 (%)
    pub usage_percent: f32,
    /// 1분 평균 부하
    pub load_one: f64,
    /// 5분 평균 부하
    pub load_five: f64,
    /// 논리 코어 수
    pub logical_cores: usize,
}

/// CPU 부하 샘플러: 측정 구간 동안 실제로 잠든다
pub trait LoadSampler: Send + Sync {
    /// `window` 동안 CPU 사용률을 측정. 측정 불가 시 None
    fn sample(&self, window: Duration) -> Option<CpuLoadSample>;
}
