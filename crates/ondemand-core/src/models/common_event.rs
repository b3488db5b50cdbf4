//! 브로드캐스트(공통 이벤트) 원시 전달 모델.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SCREEN_ON: &str = "usual.event.SCREEN_ON";
pub const SCREEN_OFF: &str = "usual.event.SCREEN_OFF";
pub const CHARGING: &str = "usual.event.CHARGING";
pub const DISCHARGING: &str = "usual.event.DISCHARGING";
pub const POWER_CONNECTED: &str = "usual.event.POWER_CONNECTED";
pub const POWER_DISCONNECTED: &str = "usual.event.POWER_DISCONNECTED";
pub const USER_UNLOCKED: &str = "usual.event.USER_UNLOCKED";
/// 최근 작업 화면 이벤트
pub const RECENT_EVENT: &str = "RECENT_EVENT";
/// RECENT_EVENT 페이로드 중 "전체 지우기" 표시 키
pub const RECENT_CLEAR_ALL: &str = "RECENT_CLEAR_ALL";

/// 항상 구독하는 기본 이벤트 이름
pub const BUILTIN_EVENTS: [&str; 8] = [
    SCREEN_ON,
    SCREEN_OFF,
    CHARGING,
    DISCHARGING,
    POWER_CONNECTED,
    POWER_DISCONNECTED,
    USER_UNLOCKED,
    RECENT_EVENT,
];

/// 페이로드 파라미터 값
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WantParam {
    Int(i32),
    Str(String),
    Bool(bool),
}

impl fmt::Display for WantParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WantParam::Int(v) => write!(f, "{v}"),
            WantParam::Str(v) => f.write_str(v),
            WantParam::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// 브로드캐스트 서브시스템이 전달하는 원시 이벤트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonEventData {
    /// 액션 이름 (= 이벤트 이름)
    pub action: String,
    pub code: i32,
    pub data: String,
    /// 발신 번들 이름
    #[serde(default)]
    pub bundle: String,
    #[serde(default)]
    pub params: BTreeMap<String, WantParam>,
}

impl CommonEventData {
    /// 액션만 가진 이벤트
    pub fn new(action: impl Into<String>, code: i32) -> Self {
        Self {
            action: action.into(),
            code,
            ..Default::default()
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: WantParam) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// 데이터 문자열 설정
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// 번들 이름 설정
    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = bundle.into();
        self
    }
}
