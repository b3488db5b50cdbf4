//! 시작/중지 제어 결정 모델.

use serde::{Deserialize, Serialize};

/// 제어 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnDemandAction {
    StartOnDemand,
    StopOnDemand,
}

/// 상관 호출마다 생성되는 제어 결정 (저장하지 않는다)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaControlInfo {
    pub action: OnDemandAction,
    pub sa_id: i32,
    pub enable_once: bool,
}

impl SaControlInfo {
    /// 시작 결정
    pub fn start(sa_id: i32, enable_once: bool) -> Self {
        Self {
            action: OnDemandAction::StartOnDemand,
            sa_id,
            enable_once,
        }
    }

    /// 중지 결정
    pub fn stop(sa_id: i32, enable_once: bool) -> Self {
        Self {
            action: OnDemandAction::StopOnDemand,
            sa_id,
            enable_once,
        }
    }
}
