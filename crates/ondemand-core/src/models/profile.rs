//! 시스템 어빌리티(SA) 프로파일 모델.
//!
//! 파일 파싱은 외부 계층 담당. 여기서는 메모리 모델과 경계 검증만 정의한다.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::models::event::OnDemandEvent;

/// 예약 범위 시작 saId
pub const FIRST_SYS_ABILITY_ID: i32 = 0x0000_0001;
/// 예약 범위 끝 saId
pub const LAST_SYS_ABILITY_ID: i32 = 0x00FF_FFFF;
/// 이벤트 이름/값 최대 길이
pub const MAX_EVENT_STRING_LENGTH: usize = 128;

/// 온디맨드 정책 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnDemandPolicyType {
    /// 시작 정책
    Start,
    /// 중지 정책
    Stop,
}

/// 시작 트리거 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOnDemand {
    #[serde(default)]
    pub on_demand_events: Vec<OnDemandEvent>,
    /// 런타임 정책 갱신 허용 여부
    #[serde(default)]
    pub allow_update: bool,
}

/// 중지 트리거 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOnDemand {
    #[serde(default)]
    pub on_demand_events: Vec<OnDemandEvent>,
    /// 런타임 정책 갱신 허용 여부
    #[serde(default)]
    pub allow_update: bool,
    /// 회수 지연 시간 (밀리초)
    #[serde(default)]
    pub delay_time: i32,
}

/// SA 프로파일
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaProfile {
    /// 전역 유일 saId
    pub sa_id: i32,
    /// 소속 프로세스 이름
    pub process_name: String,
    #[serde(default)]
    pub lib_path: String,
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub permission: String,
    /// 의존 saId 목록
    #[serde(default)]
    pub depend_sa: Vec<i32>,
    /// 의존 대기 시간 (밀리초)
    #[serde(default)]
    pub depend_timeout: i32,
    #[serde(default)]
    pub dump_level: i32,
    #[serde(default)]
    pub run_on_create: bool,
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default)]
    pub distributed: bool,
    #[serde(default)]
    pub boot_phase: String,
    #[serde(default)]
    pub start_on_demand: StartOnDemand,
    #[serde(default)]
    pub stop_on_demand: StopOnDemand,
}

impl SaProfile {
    /// 최소 필드로 프로파일 생성
    pub fn new(sa_id: i32, process_name: impl Into<String>) -> Self {
        Self {
            sa_id,
            process_name: process_name.into(),
            ..Default::default()
        }
    }

    /// 시작 이벤트 추가
    pub fn with_start_event(mut self, event: OnDemandEvent) -> Self {
        self.start_on_demand.on_demand_events.push(event);
        self
    }

    /// 중지 이벤트 추가
    pub fn with_stop_event(mut self, event: OnDemandEvent) -> Self {
        self.stop_on_demand.on_demand_events.push(event);
        self
    }

    /// 시작/중지 이벤트가 하나라도 선언되어 있는지
    pub fn has_on_demand_events(&self) -> bool {
        !self.start_on_demand.on_demand_events.is_empty()
            || !self.stop_on_demand.on_demand_events.is_empty()
    }

    /// 정책 종류별 이벤트 목록
    pub fn events(&self, policy: OnDemandPolicyType) -> &[OnDemandEvent] {
        match policy {
            OnDemandPolicyType::Start => &self.start_on_demand.on_demand_events,
            OnDemandPolicyType::Stop => &self.stop_on_demand.on_demand_events,
        }
    }

    /// 정책 종류별 이벤트 목록 (가변)
    pub fn events_mut(&mut self, policy: OnDemandPolicyType) -> &mut Vec<OnDemandEvent> {
        match policy {
            OnDemandPolicyType::Start => &mut self.start_on_demand.on_demand_events,
            OnDemandPolicyType::Stop => &mut self.stop_on_demand.on_demand_events,
        }
    }

    /// 시작·중지 이벤트 전체 순회
    pub fn all_events(&self) -> impl Iterator<Item = &OnDemandEvent> {
        self.start_on_demand
            .on_demand_events
            .iter()
            .chain(self.stop_on_demand.on_demand_events.iter())
    }

    /// 경계 검증: 데이터 모델에 들어오기 전에 호출한다
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(FIRST_SYS_ABILITY_ID..=LAST_SYS_ABILITY_ID).contains(&self.sa_id) {
            return Err(self.invalid(format!(
                "saId 범위 초과 [{FIRST_SYS_ABILITY_ID}, {LAST_SYS_ABILITY_ID}]"
            )));
        }
        if self.process_name.is_empty() {
            return Err(self.invalid("프로세스 이름 없음".to_string()));
        }
        for event in self.all_events() {
            validate_event(event).map_err(|reason| self.invalid(reason))?;
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> CoreError {
        CoreError::InvalidProfile {
            sa_id: self.sa_id,
            reason,
        }
    }
}

/// 단일 이벤트 검증 (이름 필수, 길이 제한)
pub fn validate_event(event: &OnDemandEvent) -> Result<(), String> {
    if event.name.is_empty() {
        return Err("이벤트 이름 없음".to_string());
    }
    if event.name.len() > MAX_EVENT_STRING_LENGTH || event.value.len() > MAX_EVENT_STRING_LENGTH {
        return Err(format!(
            "이벤트 이름/값 길이 초과 ({MAX_EVENT_STRING_LENGTH}): {}",
            event.name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventCategory;
    use assert_matches::assert_matches;

    #[test]
    fn profile_without_events_is_not_on_demand() {
        let profile = SaProfile::new(1001, "foundation");
        assert!(!profile.has_on_demand_events());

        let profile = profile.with_stop_event(OnDemandEvent::new(EventCategory::Param, "k", "v"));
        assert!(profile.has_on_demand_events());
    }

    #[test]
    fn validate_rejects_out_of_range_sa_id() {
        assert_matches!(
            SaProfile::new(0, "p").validate(),
            Err(CoreError::InvalidProfile { sa_id: 0, .. })
        );
        assert_matches!(
            SaProfile::new(-5, "p").validate(),
            Err(CoreError::InvalidProfile { .. })
        );
        assert_matches!(
            SaProfile::new(LAST_SYS_ABILITY_ID + 1, "p").validate(),
            Err(CoreError::InvalidProfile { .. })
        );
        assert!(SaProfile::new(LAST_SYS_ABILITY_ID, "p").validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_process_and_bad_events() {
        assert!(SaProfile::new(1001, "").validate().is_err());

        let unnamed = SaProfile::new(1001, "p")
            .with_start_event(OnDemandEvent::new(EventCategory::CommonEvent, "", ""));
        assert!(unnamed.validate().is_err());

        let long_value = SaProfile::new(1001, "p").with_start_event(OnDemandEvent::new(
            EventCategory::Param,
            "key",
            "v".repeat(MAX_EVENT_STRING_LENGTH + 1),
        ));
        assert!(long_value.validate().is_err());
    }

    #[test]
    fn events_by_policy() {
        let mut profile = SaProfile::new(1001, "p")
            .with_start_event(OnDemandEvent::new(EventCategory::Param, "a", ""))
            .with_stop_event(OnDemandEvent::new(EventCategory::Param, "b", ""));

        assert_eq!(profile.events(OnDemandPolicyType::Start)[0].name, "a");
        assert_eq!(profile.events(OnDemandPolicyType::Stop)[0].name, "b");

        profile.events_mut(OnDemandPolicyType::Stop).clear();
        assert!(profile.events(OnDemandPolicyType::Stop).is_empty());
        assert_eq!(profile.all_events().count(), 1);
    }
}
