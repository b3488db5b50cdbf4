//! 엔진 설정 구조체.
//!
//! 부가 데이터 TTL, 구독 해제 유예, 유휴 IPC 스레드 회수, CPU 유휴 샘플링 주기 등
//! 런타임 설정을 정의한다. 모든 섹션은 `#[serde(default)]`로 부분 설정 파일을 허용한다.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// 최상위 엔진 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 부가 데이터 저장소 설정
    #[serde(default)]
    pub extra_data: ExtraDataConfig,
    /// 공통 이벤트 구독 설정
    #[serde(default)]
    pub common_event: CommonEventConfig,
    /// 유휴 IPC 스레드 회수 설정
    #[serde(default)]
    pub reclaim: ReclaimConfig,
    /// CPU 유휴 감지 설정
    #[serde(default)]
    pub cpu_monitor: CpuMonitorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

// ============================================================
// 부가 데이터 저장소
// ============================================================

/// 부가 데이터 저장소 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDataConfig {
    /// 레코드 보존 시간 (밀리초)
    #[serde(default = "default_extra_data_ttl_ms")]
    pub ttl_ms: u64,
    /// 발급 ID 상한: 초과 시 1로 되돌아간다
    #[serde(default = "default_max_extra_data_id")]
    pub max_id: i64,
}

impl Default for ExtraDataConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_extra_data_ttl_ms(),
            max_id: default_max_extra_data_id(),
        }
    }
}

fn default_extra_data_ttl_ms() -> u64 {
    300_000
}

fn default_max_extra_data_id() -> i64 {
    1_000_000_000
}

// ============================================================
// 공통 이벤트
// ============================================================

/// 공통 이벤트 구독 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonEventConfig {
    /// 교체된 구독을 실제 해제하기까지 유예 시간 (밀리초)
    #[serde(default = "default_unsub_delay_ms")]
    pub unsub_delay_ms: u64,
}

impl Default for CommonEventConfig {
    fn default() -> Self {
        Self {
            unsub_delay_ms: default_unsub_delay_ms(),
        }
    }
}

fn default_unsub_delay_ms() -> u64 {
    10_000
}

// ============================================================
// 유휴 스레드 회수
// ============================================================

/// 유휴 IPC 스레드 회수 디바운스 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimConfig {
    /// 화면 꺼짐 후 회수까지 대기 시간 (밀리초)
    #[serde(default = "default_reclaim_delay_ms")]
    pub delay_ms: u64,
    /// 취소 플래그 확인 간격 (밀리초)
    #[serde(default = "default_reclaim_step_ms")]
    pub step_ms: u64,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reclaim_delay_ms(),
            step_ms: default_reclaim_step_ms(),
        }
    }
}

fn default_reclaim_delay_ms() -> u64 {
    130_000
}

fn default_reclaim_step_ms() -> u64 {
    2_000
}

// ============================================================
// CPU 유휴 감지
// ============================================================

/// CPU 유휴 감지 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMonitorConfig {
    /// 감지 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 샘플링 주기 (초)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// CPU 사용률 측정 구간 (초)
    #[serde(default = "default_sample_window_secs")]
    pub sample_window_secs: u64,
    /// 유휴 판정 CPU 사용률 상한 (%)
    #[serde(default = "default_idle_threshold_percent")]
    pub idle_threshold_percent: f32,
}

impl Default for CpuMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval_secs(),
            sample_window_secs: default_sample_window_secs(),
            idle_threshold_percent: default_idle_threshold_percent(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_sample_window_secs() -> u64 {
    5
}

fn default_idle_threshold_percent() -> f32 {
    10.0
}

impl EngineConfig {
    /// 기본 설정값 반환
    pub fn default_config() -> Self {
        Self {
            extra_data: ExtraDataConfig::default(),
            common_event: CommonEventConfig::default(),
            reclaim: ReclaimConfig::default(),
            cpu_monitor: CpuMonitorConfig::default(),
        }
    }

    /// 설정값 범위 검증
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.extra_data.ttl_ms == 0 {
            return Err(invalid("extra_data.ttl_ms", "0보다 커야 합니다"));
        }
        if self.extra_data.max_id < 1 {
            return Err(invalid("extra_data.max_id", "1 이상이어야 합니다"));
        }
        if self.reclaim.step_ms == 0 || self.reclaim.step_ms > self.reclaim.delay_ms {
            return Err(invalid(
                "reclaim.step_ms",
                "0보다 크고 delay_ms 이하여야 합니다",
            ));
        }
        if self.cpu_monitor.check_interval_secs == 0 {
            return Err(invalid("cpu_monitor.check_interval_secs", "0보다 커야 합니다"));
        }
        if !(0.0..=100.0).contains(&self.cpu_monitor.idle_threshold_percent) {
            return Err(invalid(
                "cpu_monitor.idle_threshold_percent",
                "0~100 범위여야 합니다",
            ));
        }
        Ok(())
    }

    /// 부가 데이터 TTL을 Duration으로 반환
    pub fn extra_data_ttl(&self) -> Duration {
        Duration::from_millis(self.extra_data.ttl_ms)
    }

    /// 구독 해제 유예 시간을 Duration으로 반환
    pub fn unsub_delay(&self) -> Duration {
        Duration::from_millis(self.common_event.unsub_delay_ms)
    }

    /// 회수 대기 시간을 Duration으로 반환
    pub fn reclaim_delay(&self) -> Duration {
        Duration::from_millis(self.reclaim.delay_ms)
    }

    /// 회수 취소 확인 간격을 Duration으로 반환
    pub fn reclaim_step(&self) -> Duration {
        Duration::from_millis(self.reclaim.step_ms)
    }

    /// CPU 샘플링 주기를 Duration으로 반환
    pub fn cpu_check_interval(&self) -> Duration {
        Duration::from_secs(self.cpu_monitor.check_interval_secs)
    }

    /// CPU 사용률 측정 구간을 Duration으로 반환
    pub fn cpu_sample_window(&self) -> Duration {
        Duration::from_secs(self.cpu_monitor.sample_window_secs)
    }
}

fn invalid(field: &str, message: &str) -> CoreError {
    CoreError::Validation {
        field: field.to_string(),
        message: message.to_string(),
    }
}
