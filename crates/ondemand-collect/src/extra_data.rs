//! 부가 데이터 저장소.
//!
//! 이벤트 페이로드 스냅샷을 숫자 ID로 보관하고 TTL이 지나면 제거한다.
//! 서비스별 역색인으로 "왜 시작되었는가"를 나중에 조회할 수 있게 한다.
//!
//! 레코드 테이블과 역색인은 각각 별도 락으로 보호하며 절대 중첩하지 않는다.

use ondemand_core::config::ExtraDataConfig;
use ondemand_core::models::event::NO_EXTRA_DATA_ID;
use ondemand_core::models::extra_data::OnDemandReasonExtraData;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::task_queue::TaskQueue;

#[derive(Default)]
struct RecordTable {
    last_id: i64,
    records: HashMap<i64, OnDemandReasonExtraData>,
}

/// TTL 기반 부가 데이터 저장소
pub struct ExtraDataStore {
    table: Mutex<RecordTable>,
    sa_index: Mutex<HashMap<i32, Vec<i64>>>,
    queue: TaskQueue,
    ttl: Duration,
    max_id: i64,
    this: Weak<ExtraDataStore>,
}

impl ExtraDataStore {
    /// 새 저장소 생성: 만료 작업은 `queue`에 게시된다
    pub fn new(queue: TaskQueue, config: &ExtraDataConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            table: Mutex::new(RecordTable::default()),
            sa_index: Mutex::new(HashMap::new()),
            queue,
            ttl: Duration::from_millis(config.ttl_ms),
            max_id: config.max_id.max(1),
            this: this.clone(),
        })
    }

    /// 페이로드 저장 후 새 ID 반환
    ///
    /// 만료 작업을 예약하지 못하면 레코드를 남기지 않고 `NO_EXTRA_DATA_ID`를 반환한다.
    pub fn save(&self, record: OnDemandReasonExtraData) -> i64 {
        let mut table = self.table.lock();
        let id = if table.last_id >= self.max_id {
            1
        } else {
            table.last_id + 1
        };
        table.last_id = id;
        table.records.insert(id, record);

        let weak = self.this.clone();
        let scheduled = self.queue.post_delayed(
            Box::new(move || {
                if let Some(store) = weak.upgrade() {
                    store.evict(id);
                }
            }),
            self.ttl,
        );
        if !scheduled {
            table.records.remove(&id);
            warn!("부가 데이터 만료 예약 실패, 저장 취소: id={id}");
            return NO_EXTRA_DATA_ID;
        }

        debug!("부가 데이터 저장: id={id}, n={}", table.records.len());
        id
    }

    /// ID로 조회: 없으면(만료 포함) None
    pub fn get(&self, id: i64) -> Option<OnDemandReasonExtraData> {
        self.table.lock().records.get(&id).cloned()
    }

    /// 레코드 제거 및 역색인 정리 (빈 목록은 키째 제거)
    pub fn evict(&self, id: i64) {
        let removed = self.table.lock().records.remove(&id).is_some();
        debug!("부가 데이터 제거: id={id}, 존재={removed}");
        self.unindex(id);
    }

    fn unindex(&self, id: i64) {
        let mut index = self.sa_index.lock();
        index.retain(|sa_id, ids| {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                info!("역색인 제거: SA={sa_id}");
                false
            } else {
                true
            }
        });
    }

    /// 상관 결과로 매칭된 서비스들에 부가 데이터 ID 연결
    ///
    /// 테이블에 없는 ID(만료 또는 미저장)는 색인하지 않는다.
    pub fn index_for_services(&self, id: i64, sa_ids: &[i32]) {
        if id <= 0 || sa_ids.is_empty() {
            return;
        }
        if !self.contains(id) {
            debug!("없는 부가 데이터, 역색인 생략: id={id}");
            return;
        }
        {
            let mut index = self.sa_index.lock();
            for sa_id in sa_ids {
                let ids = index.entry(*sa_id).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
                info!("역색인 저장: SA={sa_id}, exId={id}, n={}", ids.len());
            }
        }
        // 확인과 색인 사이에 만료가 끼어들었으면 직접 정리
        if !self.contains(id) {
            self.unindex(id);
        }
    }

    /// 레코드가 아직 보관 중인지
    pub fn contains(&self, id: i64) -> bool {
        self.table.lock().records.contains_key(&id)
    }

    /// 서비스의 부가 데이터 ID 목록 (이벤트 이름 필터는 빈 문자열이면 생략)
    pub fn list_for_service(&self, sa_id: i32, event_name: &str) -> Vec<i64> {
        let ids = match self.sa_index.lock().get(&sa_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };
        let table = self.table.lock();
        ids.into_iter()
            .filter(|id| {
                table.records.get(id).is_some_and(|record| {
                    event_name.is_empty() || record.event_name() == event_name
                })
            })
            .collect()
    }

    /// 서비스 역색인 전체 제거
    pub fn clear_service(&self, sa_id: i32) {
        if self.sa_index.lock().remove(&sa_id).is_some() {
            info!("역색인 초기화: SA={sa_id}");
        }
    }

    /// 역색인에 등록된 서비스 목록 (오름차순)
    pub fn indexed_services(&self) -> Vec<i32> {
        let mut services: Vec<i32> = self.sa_index.lock().keys().copied().collect();
        services.sort_unstable();
        services
    }

    /// 보관 중인 레코드 수
    pub fn len(&self) -> usize {
        self.table.lock().records.len()
    }

    /// 보관 중인 레코드가 없는지
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn force_last_id(&self, id: i64) {
        self.table.lock().last_id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondemand_core::models::extra_data::EVENT_NAME_KEY;
    use std::collections::BTreeMap;

    fn record(event_name: &str) -> OnDemandReasonExtraData {
        let mut want = BTreeMap::new();
        want.insert(EVENT_NAME_KEY.to_string(), event_name.to_string());
        OnDemandReasonExtraData::new(0, "", want)
    }

    fn store_with_ttl(ttl_ms: u64) -> Arc<ExtraDataStore> {
        let config = ExtraDataConfig {
            ttl_ms,
            ..ExtraDataConfig::default()
        };
        ExtraDataStore::new(TaskQueue::new("extra_data"), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn ids_start_at_one_and_increase() {
        let store = store_with_ttl(1_000);
        assert_eq!(store.save(record("a")), 1);
        assert_eq!(store.save(record("b")), 2);
        assert_eq!(store.get(2).map(|r| r.event_name().to_string()), Some("b".into()));
        assert!(store.get(3).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn id_wraps_to_one_never_zero() {
        let store = store_with_ttl(1_000);
        store.force_last_id(1_000_000_000);
        let id = store.save(record("wrap"));
        assert_eq!(id, 1);
        assert!(store.get(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn record_expires_after_ttl() {
        let store = store_with_ttl(300_000);
        let id = store.save(record("a"));

        tokio::time::sleep(Duration::from_millis(299_000)).await;
        assert!(store.get(id).is_some());

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_drops_empty_index_entry() {
        let store = store_with_ttl(100);
        let id = store.save(record("a"));
        store.index_for_services(id, &[1001]);
        assert_eq!(store.list_for_service(1001, ""), vec![id]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.list_for_service(1001, "").is_empty());
        assert!(!store.indexed_services().contains(&1001));
    }

    #[tokio::test(start_paused = true)]
    async fn evict_keeps_other_ids_for_service() {
        let store = store_with_ttl(10_000);
        let first = store.save(record("a"));
        let second = store.save(record("b"));
        store.index_for_services(first, &[1001, 1002]);
        store.index_for_services(second, &[1001]);

        store.evict(first);
        assert_eq!(store.list_for_service(1001, ""), vec![second]);
        assert_eq!(store.indexed_services(), vec![1001]);
    }

    #[tokio::test(start_paused = true)]
    async fn list_filters_by_event_name() {
        let store = store_with_ttl(10_000);
        let on = store.save(record("usual.event.SCREEN_ON"));
        let off = store.save(record("usual.event.SCREEN_OFF"));
        store.index_for_services(on, &[7]);
        store.index_for_services(off, &[7]);

        assert_eq!(store.list_for_service(7, "usual.event.SCREEN_OFF"), vec![off]);
        assert_eq!(store.list_for_service(7, ""), vec![on, off]);
        assert!(store.list_for_service(8, "").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn index_ignores_sentinel_and_duplicates() {
        let store = store_with_ttl(10_000);
        store.index_for_services(NO_EXTRA_DATA_ID, &[1]);
        store.index_for_services(0, &[1]);
        assert!(store.indexed_services().is_empty());

        let id = store.save(record("a"));
        store.index_for_services(id, &[1]);
        store.index_for_services(id, &[1]);
        assert_eq!(store.list_for_service(1, ""), vec![id]);

        store.clear_service(1);
        assert!(store.indexed_services().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_or_expired_id_is_not_indexed() {
        let store = store_with_ttl(100);
        store.index_for_services(42, &[1001]);
        assert!(store.indexed_services().is_empty());

        let id = store.save(record("a"));
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        store.index_for_services(id, &[1001]);

        assert!(store.list_for_service(1001, "").is_empty());
        assert!(store.indexed_services().is_empty());
    }

    #[test]
    fn save_without_worker_keeps_nothing() {
        let store = ExtraDataStore::new(TaskQueue::new("dead"), &ExtraDataConfig::default());
        assert_eq!(store.save(record("a")), NO_EXTRA_DATA_ID);
        assert!(store.is_empty());
    }
}
