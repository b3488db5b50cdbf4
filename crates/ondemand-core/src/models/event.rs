//! 온디맨드 이벤트 모델.
//!
//! 프로파일에 선언되는 이벤트 템플릿과 수집 플러그인이 보고하는 실제 이벤트가
//! 같은 `OnDemandEvent` 구조를 공유한다. 보고된 인스턴스만 `extra_data_id`를 가진다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 부가 데이터가 없음을 뜻하는 센티널 ID
pub const NO_EXTRA_DATA_ID: i64 = -1;

/// 이벤트 소스 카테고리 (eventId)
///
/// 카테고리마다 정확히 하나의 수집 플러그인이 대응한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    /// 원격 디바이스 온라인/오프라인
    DeviceOnline,
    /// 설정 스위치
    SettingSwitch,
    /// 시스템 파라미터
    Param,
    /// 브로드캐스트(공통 이벤트)
    CommonEvent,
    /// 타이머
    TimedEvent,
}

impl EventCategory {
    /// 전체 카테고리 목록
    pub const ALL: [EventCategory; 5] = [
        EventCategory::DeviceOnline,
        EventCategory::SettingSwitch,
        EventCategory::Param,
        EventCategory::CommonEvent,
        EventCategory::TimedEvent,
    ];

    /// 안정적인 숫자 ID
    pub fn id(self) -> i32 {
        match self {
            EventCategory::DeviceOnline => 1,
            EventCategory::SettingSwitch => 2,
            EventCategory::Param => 3,
            EventCategory::CommonEvent => 4,
            EventCategory::TimedEvent => 5,
        }
    }

    /// 숫자 ID → 카테고리 (미지원 ID는 None)
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id)
    }

    /// 프로파일 태그 이름
    pub fn tag(self) -> &'static str {
        match self {
            EventCategory::DeviceOnline => "deviceonline",
            EventCategory::SettingSwitch => "settingswitch",
            EventCategory::Param => "param",
            EventCategory::CommonEvent => "commonevent",
            EventCategory::TimedEvent => "timedevent",
        }
    }

    /// 프로파일 태그 이름 → 카테고리
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tag(), self.id())
    }
}

/// 온디맨드 조건: 트리거 이벤트 외에 AND로 결합되는 추가 요구사항
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandCondition {
    /// 조건 카테고리
    pub event_id: EventCategory,
    /// 신호 이름
    pub name: String,
    /// 기대 값 (빈 문자열이면 값 비교 생략)
    #[serde(default)]
    pub value: String,
    /// 부가 필드별 관계식 (예: `"level" → ">=3"`)
    #[serde(default)]
    pub extra_messages: BTreeMap<String, String>,
}

impl OnDemandCondition {
    /// 새 조건 생성
    pub fn new(event_id: EventCategory, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_id,
            name: name.into(),
            value: value.into(),
            extra_messages: BTreeMap::new(),
        }
    }

    /// 부가 필드 관계식 추가
    pub fn with_extra_message(mut self, key: impl Into<String>, relation: impl Into<String>) -> Self {
        self.extra_messages.insert(key.into(), relation.into());
        self
    }
}

/// 온디맨드 이벤트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandEvent {
    /// 이벤트 카테고리
    pub event_id: EventCategory,
    /// 이벤트 이름 (브로드캐스트 액션, 파라미터 키 등)
    pub name: String,
    /// 이벤트 값 (템플릿에서 빈 문자열이면 모든 값과 일치)
    #[serde(default)]
    pub value: String,
    /// 보고된 인스턴스의 부가 데이터 ID
    #[serde(default = "default_extra_data_id")]
    pub extra_data_id: i64,
    /// AND 결합 조건 목록
    #[serde(default)]
    pub conditions: Vec<OnDemandCondition>,
    /// 한 번만 적용 여부
    #[serde(default)]
    pub enable_once: bool,
    /// 이벤트 자체 부가 필드 관계식
    #[serde(default)]
    pub extra_messages: BTreeMap<String, String>,
}

fn default_extra_data_id() -> i64 {
    NO_EXTRA_DATA_ID
}

impl OnDemandEvent {
    /// 새 이벤트 생성 (조건 없음, 부가 데이터 없음)
    pub fn new(event_id: EventCategory, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event_id,
            name: name.into(),
            value: value.into(),
            extra_data_id: NO_EXTRA_DATA_ID,
            conditions: Vec::new(),
            enable_once: false,
            extra_messages: BTreeMap::new(),
        }
    }

    /// 조건 목록 설정
    pub fn with_conditions(mut self, conditions: Vec<OnDemandCondition>) -> Self {
        self.conditions = conditions;
        self
    }

    /// enable-once 설정
    pub fn with_enable_once(mut self, enable_once: bool) -> Self {
        self.enable_once = enable_once;
        self
    }

    /// 부가 데이터 ID 설정
    pub fn with_extra_data_id(mut self, extra_data_id: i64) -> Self {
        self.extra_data_id = extra_data_id;
        self
    }

    /// 이벤트 자체 부가 필드 관계식 추가
    pub fn with_extra_message(mut self, key: impl Into<String>, relation: impl Into<String>) -> Self {
        self.extra_messages.insert(key.into(), relation.into());
        self
    }

    /// 보고된 이벤트가 이 템플릿과 일치하는지 (카테고리/이름 동일 + 값 일치 또는 와일드카드)
    ///
    /// 조건 평가는 포함하지 않는다.
    pub fn matches(&self, reported: &OnDemandEvent) -> bool {
        self.event_id == reported.event_id
            && self.name == reported.name
            && (self.value.is_empty() || self.value == reported.value)
    }

    /// 유효한 부가 데이터 ID를 가지고 있는지
    pub fn has_extra_data(&self) -> bool {
        self.extra_data_id > 0
    }
}
