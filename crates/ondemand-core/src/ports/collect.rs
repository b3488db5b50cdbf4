//! 이벤트 수집 플러그인 포트.
//!
//! 구현: `ondemand-collect` crate (공통 이벤트, 파라미터/스위치, 네트워킹, 타이머)

use crate::error::CoreError;
use crate::models::event::{EventCategory, OnDemandCondition, OnDemandEvent};
use crate::models::extra_data::OnDemandReasonExtraData;
use crate::models::profile::SaProfile;

/// 카테고리 하나를 담당하는 수집 플러그인
///
/// 원시 소스 알림을 `OnDemandEvent`로 정규화하여 `Reporter`로 올려보내고,
/// 자기 카테고리 조건을 캐시된 상태로 평가한다.
pub trait CollectPlugin: Send + Sync {
    /// 담당 카테고리
    fn category(&self) -> EventCategory;

    /// 온디맨드 프로파일을 한 번 훑어 감시 이름 집합과 기본 상태를 구성
    fn init(&self, profiles: &[SaProfile]);

    /// 수집 시작 (멱등)
    fn on_start(&self) -> Result<(), CoreError>;

    /// 수집 중지 (멱등, 시작 실패 후에도 안전)
    fn on_stop(&self) -> Result<(), CoreError>;

    /// 캐시된 신호 상태로 조건 평가: I/O로 블로킹하지 않는다
    fn check_condition(&self, _condition: &OnDemandCondition) -> bool {
        false
    }

    /// 보고된 이벤트의 부가 데이터가 프로파일 이벤트의 부가 필드 관계식을 만족하는지
    fn check_extra_message(&self, _extra_data_id: i64, profile_event: &OnDemandEvent) -> bool {
        profile_event.extra_messages.is_empty()
    }

    /// 런타임 정책 갱신 시 감시 이름 추가
    fn add_collect_event(&self, _events: &[OnDemandEvent]) -> Result<(), CoreError> {
        Ok(())
    }

    /// 더 이상 참조되지 않는 감시 이름 제거
    fn remove_unused_event(&self, _event: &OnDemandEvent) -> Result<(), CoreError> {
        Ok(())
    }

    /// 부가 데이터 조회 (부가 데이터를 만드는 플러그인만 의미 있음)
    fn get_on_demand_reason_extra_data(&self, _extra_data_id: i64) -> Option<OnDemandReasonExtraData> {
        None
    }
}
