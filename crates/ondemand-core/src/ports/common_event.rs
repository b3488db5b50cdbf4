//! 브로드캐스트(공통 이벤트) 서브시스템 포트.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::CoreError;
use crate::models::common_event::CommonEventData;

/// 구독 핸들
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// 비동기 전달을 받는 수신자
pub trait CommonEventReceiver: Send + Sync {
    /// 이벤트 수신: 최소한의 작업만 하고 큐로 넘긴다
    fn on_receive_event(&self, data: CommonEventData);
}

/// 브로드캐스트 서브시스템
pub trait CommonEventService: Send + Sync {
    /// 필터 집합으로 구독 생성
    fn subscribe(
        &self,
        events: &BTreeSet<String>,
        receiver: Arc<dyn CommonEventReceiver>,
    ) -> Result<SubscriptionId, CoreError>;

    /// 구독 해제
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
