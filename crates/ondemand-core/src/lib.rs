//! # ondemand-core
//!
//! 온디맨드 활성화 엔진 도메인 모델, 포트(trait) 정의, 에러 타입.
//! 수집 크레이트와 외부 협력자가 공유하는 핵심 타입과 인터페이스를 제공한다.
//!
//! ## 구조
//!
//! - [`models`]: 프로파일, 이벤트, 제어 결정, 부가 데이터 (serde Serialize/Deserialize)
//! - [`ports`]: Hexagonal Architecture 포트 인터페이스
//! - [`error`]: 핵심 에러 타입 (thiserror)
//! - [`config`]: 엔진 설정 구조체
//! - [`config_manager`]: 설정 파일 관리 (로드/저장)
//! - [`logic`]: 조건 관계식 평가

pub mod config;
pub mod config_manager;
pub mod error;
pub mod logic;
pub mod models;
pub mod ports;

#[cfg(test)]
mod tests {
    use crate::error::CoreError;
    use crate::models::control::{OnDemandAction, SaControlInfo};
    use crate::models::event::{EventCategory, OnDemandCondition, OnDemandEvent};
    use crate::models::profile::SaProfile;

    #[test]
    fn profile_serde_roundtrip() {
        let profile = SaProfile::new(1001, "foundation").with_start_event(
            OnDemandEvent::new(EventCategory::CommonEvent, "usual.event.SCREEN_ON", "")
                .with_conditions(vec![OnDemandCondition::new(
                    EventCategory::Param,
                    "persist.sys.mode",
                    "on",
                )])
                .with_enable_once(true),
        );

        let json = serde_json::to_string(&profile).unwrap();
        let deserialized: SaProfile = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, profile);
        assert!(deserialized.start_on_demand.on_demand_events[0].enable_once);
    }

    #[test]
    fn control_info_constructors() {
        assert_eq!(
            SaControlInfo::start(1001, false).action,
            OnDemandAction::StartOnDemand
        );
        assert_eq!(
            SaControlInfo::stop(1001, true),
            SaControlInfo {
                action: OnDemandAction::StopOnDemand,
                sa_id: 1001,
                enable_once: true,
            }
        );
    }

    #[test]
    fn error_messages_name_category() {
        let err = CoreError::UnsupportedCategory(EventCategory::TimedEvent);
        assert!(err.to_string().contains("timedevent"));
    }
}
