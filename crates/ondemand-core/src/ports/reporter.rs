//! 플러그인 → 상관기 상향 호출 포트.

use std::time::Duration;

use crate::models::event::OnDemandEvent;

/// 큐에 올리는 작업 단위
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 수집 플러그인이 상관기에 이벤트/작업을 넘기는 통로
///
/// 모든 메서드는 상관기 큐에 게시만 하고 즉시 반환한다.
/// 플러그인 락을 쥔 채 상관기로 동기 호출하지 않기 위함.
pub trait Reporter: Send + Sync {
    /// 정규화된 이벤트 보고
    fn report_event(&self, event: OnDemandEvent);

    /// 상관기 큐에 작업 게시
    fn post_task(&self, task: Task) -> bool;

    /// 상관기 큐에 지연 작업 게시
    fn post_delay_task(&self, task: Task, delay: Duration) -> bool;
}
