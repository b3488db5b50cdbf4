//! 스케줄러(서비스 상태 머신) 포트.
//!
//! 이 엔진은 프로세스를 직접 시작/중지하지 않는다. 제어 결정만 넘긴다.

use crate::models::control::SaControlInfo;
use crate::models::event::OnDemandEvent;

/// 상관 결과를 받아 실제 시작/중지를 수행하는 외부 협력자
pub trait OnDemandScheduler: Send + Sync {
    /// 트리거 이벤트와 제어 결정 목록 처리
    fn process_on_demand_event(&self, event: &OnDemandEvent, controls: &[SaControlInfo]);
}
