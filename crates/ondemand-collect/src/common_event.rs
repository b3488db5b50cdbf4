//! 공통 이벤트(브로드캐스트) 수집 플러그인.
//!
//! 감시 이름 집합과 정확히 같은 필터로 구독을 유지한다. 감시 집합이 바뀔 때마다
//! 새 구독을 만들고, 이전 구독은 전달 중인 이벤트와 겹치지 않도록 유예 후 해제한다.
//!
//! 수신한 브로드캐스트는 페이로드를 부가 데이터로 저장하고, 조건 평가용 캐시를
//! 갱신한 뒤 `OnDemandEvent`로 정규화하여 상관기에 보고한다.

use ondemand_core::config::EngineConfig;
use ondemand_core::error::CoreError;
use ondemand_core::logic::check_logic_relationship;
use ondemand_core::models::common_event::{
    CommonEventData, WantParam, BUILTIN_EVENTS, CHARGING, DISCHARGING, POWER_CONNECTED,
    POWER_DISCONNECTED, RECENT_CLEAR_ALL, RECENT_EVENT, SCREEN_OFF, SCREEN_ON, USER_UNLOCKED,
};
use ondemand_core::models::event::{EventCategory, OnDemandCondition, OnDemandEvent};
use ondemand_core::models::extra_data::{
    OnDemandReasonExtraData, BUNDLE_NAME_KEY, EVENT_NAME_KEY, MISSING_FIELD_VALUE, NET_TYPE_KEY,
    UID_KEY,
};
use ondemand_core::models::profile::SaProfile;
use ondemand_core::ports::collect::CollectPlugin;
use ondemand_core::ports::common_event::{CommonEventReceiver, CommonEventService, SubscriptionId};
use ondemand_core::ports::ipc::IpcThreadControl;
use ondemand_core::ports::monitor::LoadSampler;
use ondemand_core::ports::reporter::{Reporter, Task};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cpu_monitor::{CpuLoadMonitor, IdleCallback};
use crate::extra_data::ExtraDataStore;
use crate::reclaim::IdleThreadReclaimer;
use crate::task_queue::TaskQueue;

/// 현재 상태가 있어야만 조건을 만족하는 이벤트 (한 번 본 것으로는 부족)
const STATEFUL_EVENTS: [&str; 7] = [
    SCREEN_ON,
    SCREEN_OFF,
    CHARGING,
    DISCHARGING,
    POWER_CONNECTED,
    POWER_DISCONNECTED,
    USER_UNLOCKED,
];

/// 조건 평가용 캐시
#[derive(Debug, Default)]
struct ConditionState {
    /// 현재 유효한 상태 이벤트
    whitelist: BTreeSet<String>,
    /// 이벤트별 마지막 코드 문자열
    last_code: HashMap<String, String>,
    /// 이벤트별 조건 부가 필드 마지막 값
    extra_fields: HashMap<String, BTreeMap<String, String>>,
}

/// 공통 이벤트 수집 플러그인
pub struct CommonEventCollect {
    reporter: Arc<dyn Reporter>,
    service: Arc<dyn CommonEventService>,
    store: Arc<ExtraDataStore>,
    unsub_delay: Duration,
    /// 감시 이름 집합
    event_names: Mutex<BTreeSet<String>>,
    state: Mutex<ConditionState>,
    /// 구독 락: 감시 집합 변경과 구독 교체를 직렬화한다
    subscription: Mutex<Option<SubscriptionId>>,
    /// 해제 대기 중인 이전 구독
    retired: Mutex<Vec<SubscriptionId>>,
    work_queue: Mutex<Option<TaskQueue>>,
    unsub_queue: Mutex<Option<TaskQueue>>,
    reclaimer: Option<IdleThreadReclaimer>,
    cpu_monitor: Option<CpuLoadMonitor>,
    this: Weak<CommonEventCollect>,
}

impl CommonEventCollect {
    /// 새 플러그인 생성
    ///
    /// `ipc`가 없으면 유휴 스레드 회수를, `load_sampler`까지 없으면 CPU 유휴 감지를 생략한다.
    pub fn new(
        reporter: Arc<dyn Reporter>,
        service: Arc<dyn CommonEventService>,
        store: Arc<ExtraDataStore>,
        ipc: Option<Arc<dyn IpcThreadControl>>,
        load_sampler: Option<Arc<dyn LoadSampler>>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let reclaimer = ipc.as_ref().map(|ipc| {
            IdleThreadReclaimer::new(ipc.clone(), config.reclaim_delay(), config.reclaim_step())
        });
        let cpu_monitor = match (&ipc, load_sampler) {
            (Some(ipc), Some(sampler)) if config.cpu_monitor.enabled => {
                let ipc = ipc.clone();
                let on_idle: IdleCallback = Arc::new(move || ipc.trigger_idle_thread_reclaim());
                Some(CpuLoadMonitor::new(sampler, &config.cpu_monitor, on_idle))
            }
            _ => None,
        };

        Arc::new_cyclic(|this| Self {
            reporter,
            service,
            store,
            unsub_delay: config.unsub_delay(),
            event_names: Mutex::new(BTreeSet::new()),
            state: Mutex::new(ConditionState::default()),
            subscription: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
            work_queue: Mutex::new(None),
            unsub_queue: Mutex::new(None),
            reclaimer,
            cpu_monitor,
            this: this.clone(),
        })
    }

    /// 현재 감시 이름 집합 (복제본)
    pub fn watched_events(&self) -> BTreeSet<String> {
        self.event_names.lock().clone()
    }

    /// 현재 활성 구독
    pub fn current_subscription(&self) -> Option<SubscriptionId> {
        *self.subscription.lock()
    }

    /// 플러그인이 시작되어 큐가 살아 있는지
    pub fn is_started(&self) -> bool {
        self.work_queue.lock().is_some()
    }

    /// 브로드캐스트 서비스가 (재)기동되었을 때 구독을 다시 만든다
    pub fn on_service_ready(&self) -> bool {
        info!("공통 이벤트 서비스 준비됨, 구독 생성 예약");
        let weak = self.this.clone();
        self.post_work(Box::new(move || {
            if let Some(collect) = weak.upgrade() {
                if let Err(e) = collect.create_subscription() {
                    error!("공통 이벤트 구독 생성 실패: {e}");
                }
            }
        }))
    }

    /// 사용자 잠금/전환 시 USER_UNLOCKED 상태 제거
    pub fn remove_user_unlocked_state(&self) {
        let mut state = self.state.lock();
        state.whitelist.remove(USER_UNLOCKED);
        info!("USER_UNLOCKED 상태 제거, n={}", state.whitelist.len());
    }

    /// 원시 브로드캐스트 처리
    fn handle_event(&self, data: CommonEventData) {
        self.save_action(&data.action);
        let extra_data_id = self.save_reason_extra_data(&data);
        info!(
            "공통 이벤트 수신: {}, code={}, exId={extra_data_id}",
            data.action, data.code
        );
        self.save_condition_extra_data(&data);

        let event = OnDemandEvent::new(
            EventCategory::CommonEvent,
            data.action.clone(),
            data.code.to_string(),
        )
        .with_extra_data_id(extra_data_id);
        self.reporter.report_event(event);

        self.start_reclaim_work(&data);
    }

    /// 상태 이벤트 전이: 화면/충전/전원은 상호 배타
    fn save_action(&self, action: &str) {
        let opposite = match action {
            SCREEN_ON => Some(SCREEN_OFF),
            SCREEN_OFF => Some(SCREEN_ON),
            CHARGING => Some(DISCHARGING),
            DISCHARGING => Some(CHARGING),
            POWER_CONNECTED => Some(POWER_DISCONNECTED),
            POWER_DISCONNECTED => Some(POWER_CONNECTED),
            USER_UNLOCKED => None,
            _ => return,
        };

        let mut state = self.state.lock();
        state.whitelist.insert(action.to_string());
        if let Some(opposite) = opposite {
            state.whitelist.remove(opposite);
        }
    }

    /// 페이로드를 평탄화하여 부가 데이터로 저장
    fn save_reason_extra_data(&self, data: &CommonEventData) -> i64 {
        let mut want: BTreeMap<String, String> = data
            .params
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect();
        want.insert(UID_KEY.to_string(), int_param(data, UID_KEY));
        want.insert(NET_TYPE_KEY.to_string(), int_param(data, NET_TYPE_KEY));
        want.insert(BUNDLE_NAME_KEY.to_string(), data.bundle.clone());
        want.insert(EVENT_NAME_KEY.to_string(), data.action.clone());

        self.store
            .save(OnDemandReasonExtraData::new(data.code, data.data.clone(), want))
    }

    /// 조건 평가용 코드/부가 필드 캐시 갱신 (등록된 부가 필드 키만)
    fn save_condition_extra_data(&self, data: &CommonEventData) {
        let mut state = self.state.lock();
        state
            .last_code
            .insert(data.action.clone(), data.code.to_string());
        if let Some(fields) = state.extra_fields.get_mut(&data.action) {
            for (key, value) in fields.iter_mut() {
                *value = data
                    .params
                    .get(key)
                    .map(WantParam::to_string)
                    .unwrap_or_default();
            }
        }
    }

    /// 화면 꺼짐/최근 작업 전체 지우기 → 유휴 IPC 스레드 회수 디바운스
    fn start_reclaim_work(&self, data: &CommonEventData) {
        let Some(reclaimer) = &self.reclaimer else {
            return;
        };

        let trigger = match data.action.as_str() {
            SCREEN_OFF => true,
            SCREEN_ON => {
                reclaimer.cancel();
                false
            }
            RECENT_EVENT if data.data == RECENT_CLEAR_ALL => {
                reclaimer.trigger_now();
                true
            }
            _ => false,
        };
        if trigger {
            reclaimer.schedule();
        }
    }

    /// 프로파일 이벤트 하나에서 감시 이름과 조건 부가 필드 키를 수집
    fn register_event_state(&self, event: &OnDemandEvent) -> Vec<String> {
        let mut inserted = Vec::new();
        {
            let mut names = self.event_names.lock();
            if event.event_id == EventCategory::CommonEvent && names.insert(event.name.clone()) {
                inserted.push(event.name.clone());
            }
            for condition in conditions_of(event) {
                if names.insert(condition.name.clone()) {
                    inserted.push(condition.name.clone());
                }
            }
        }

        let mut state = self.state.lock();
        for condition in conditions_of(event) {
            if condition.extra_messages.is_empty() {
                continue;
            }
            let fields = state.extra_fields.entry(condition.name.clone()).or_default();
            for key in condition.extra_messages.keys() {
                fields.entry(key.clone()).or_default();
            }
        }
        inserted
    }

    /// 감시에서 빠진 이름의 캐시 상태 정리
    fn forget_event_state(&self, names: &[String]) {
        let mut state = self.state.lock();
        for name in names {
            state.extra_fields.remove(name);
            state.last_code.remove(name);
        }
    }

    fn create_subscription(&self) -> Result<(), CoreError> {
        let mut guard = self.subscription.lock();
        self.create_subscription_locked(&mut guard)
    }

    /// 현재 감시 집합으로 새 구독 생성. 성공 시 이전 구독은 유예 후 해제
    ///
    /// 실패하면 이전 구독을 그대로 유지한다.
    fn create_subscription_locked(
        &self,
        current: &mut Option<SubscriptionId>,
    ) -> Result<(), CoreError> {
        let names = self.event_names.lock().clone();
        let receiver: Arc<dyn CommonEventReceiver> = Arc::new(CommonEventSubscriber {
            collect: self.this.clone(),
        });

        let begin = Instant::now();
        let result = self.service.subscribe(&names, receiver);
        info!(
            "공통 이벤트 구독 {}ms {} (n={})",
            begin.elapsed().as_millis(),
            if result.is_ok() { "성공" } else { "실패" },
            names.len()
        );

        let id = result.map_err(|e| match e {
            CoreError::Subscription(_) => e,
            other => CoreError::Subscription(other.to_string()),
        })?;
        if let Some(previous) = current.replace(id) {
            self.retire_subscription(previous);
        }
        Ok(())
    }

    /// 이전 구독을 유예 후 해제 (해제 큐가 없으면 즉시)
    fn retire_subscription(&self, id: SubscriptionId) {
        let queue = self.unsub_queue.lock().clone();
        let Some(queue) = queue else {
            warn!("해제 큐 없음, 구독 즉시 해제: {id:?}");
            self.unsubscribe(id);
            return;
        };

        self.retired.lock().push(id);
        let weak = self.this.clone();
        let service = self.service.clone();
        let posted = queue.post_delayed(
            Box::new(move || {
                let pending = match weak.upgrade() {
                    Some(collect) => collect.take_retired(id),
                    None => true,
                };
                if pending {
                    debug!("이전 구독 해제: {id:?}");
                    if !service.unsubscribe(id) {
                        error!("이전 구독 해제 실패: {id:?}");
                    }
                }
            }),
            self.unsub_delay,
        );
        if !posted && self.take_retired(id) {
            self.unsubscribe(id);
        }
    }

    fn take_retired(&self, id: SubscriptionId) -> bool {
        let mut retired = self.retired.lock();
        match retired.iter().position(|pending| *pending == id) {
            Some(pos) => {
                retired.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if !self.service.unsubscribe(id) {
            error!("구독 해제 실패: {id:?}");
        }
    }

    fn post_work(&self, task: Task) -> bool {
        match self.work_queue.lock().as_ref() {
            Some(queue) => queue.post(task),
            None => {
                warn!("공통 이벤트 작업 큐 없음 (시작 전)");
                false
            }
        }
    }
}

impl CollectPlugin for CommonEventCollect {
    fn category(&self) -> EventCategory {
        EventCategory::CommonEvent
    }

    fn init(&self, profiles: &[SaProfile]) {
        {
            let mut state = self.state.lock();
            state.whitelist.insert(SCREEN_ON.to_string());
            state.whitelist.insert(DISCHARGING.to_string());
            state.whitelist.insert(POWER_DISCONNECTED.to_string());
        }
        {
            let mut names = self.event_names.lock();
            names.extend(BUILTIN_EVENTS.iter().map(|name| name.to_string()));
        }
        for event in profiles.iter().flat_map(|profile| profile.all_events()) {
            self.register_event_state(event);
        }
        debug!("공통 이벤트 초기화: 감시 {}개", self.event_names.lock().len());
    }

    fn on_start(&self) -> Result<(), CoreError> {
        info!("공통 이벤트 수집 시작");
        if self.event_names.lock().is_empty() {
            warn!("감시할 공통 이벤트 없음");
            return Ok(());
        }
        {
            let mut work = self.work_queue.lock();
            if work.is_some() {
                return Ok(());
            }
            *work = Some(TaskQueue::new("common_event_work"));
        }
        *self.unsub_queue.lock() = Some(TaskQueue::new("common_event_unsub"));

        if !self.on_service_ready() {
            return Err(CoreError::QueueUnavailable("common_event_work".to_string()));
        }
        if let Some(monitor) = &self.cpu_monitor {
            monitor.start();
        }
        Ok(())
    }

    fn on_stop(&self) -> Result<(), CoreError> {
        if let Some(queue) = self.work_queue.lock().take() {
            queue.shutdown();
        }
        if let Some(queue) = self.unsub_queue.lock().take() {
            queue.shutdown();
        }
        if let Some(monitor) = &self.cpu_monitor {
            monitor.stop();
        }
        if let Some(reclaimer) = &self.reclaimer {
            reclaimer.shutdown();
        }

        let current = self.subscription.lock().take();
        let retired: Vec<SubscriptionId> = std::mem::take(&mut *self.retired.lock());
        for id in current.into_iter().chain(retired) {
            self.unsubscribe(id);
        }
        Ok(())
    }

    fn check_condition(&self, condition: &OnDemandCondition) -> bool {
        let state = self.state.lock();
        let cached = state.extra_fields.get(&condition.name);
        for (key, expected) in &condition.extra_messages {
            let current = cached
                .and_then(|fields| fields.get(key))
                .map(String::as_str)
                .unwrap_or("");
            if !check_logic_relationship(current, expected) {
                return false;
            }
        }

        if !condition.value.is_empty() {
            let last = state
                .last_code
                .get(&condition.name)
                .map(String::as_str)
                .unwrap_or("");
            if last != condition.value {
                return false;
            }
        }

        if STATEFUL_EVENTS.contains(&condition.name.as_str()) {
            return state.whitelist.contains(&condition.name);
        }
        true
    }

    fn check_extra_message(&self, extra_data_id: i64, profile_event: &OnDemandEvent) -> bool {
        let Some(record) = self.store.get(extra_data_id) else {
            return false;
        };
        profile_event.extra_messages.iter().all(|(key, expected)| {
            let current = record.want.get(key).map(String::as_str).unwrap_or("");
            check_logic_relationship(current, expected)
        })
    }

    fn add_collect_event(&self, events: &[OnDemandEvent]) -> Result<(), CoreError> {
        let mut subscription = self.subscription.lock();
        let inserted: Vec<String> = events
            .iter()
            .flat_map(|event| self.register_event_state(event))
            .collect();
        if inserted.is_empty() {
            return Ok(());
        }
        for name in &inserted {
            info!("공통 이벤트 감시 추가: {name}");
        }
        if !self.is_started() {
            return Ok(());
        }

        if let Err(e) = self.create_subscription_locked(&mut subscription) {
            error!("감시 추가 후 구독 실패, 롤백: {e}");
            {
                let mut names = self.event_names.lock();
                for name in &inserted {
                    names.remove(name);
                }
            }
            self.forget_event_state(&inserted);
            return Err(e);
        }
        Ok(())
    }

    fn remove_unused_event(&self, event: &OnDemandEvent) -> Result<(), CoreError> {
        if BUILTIN_EVENTS.contains(&event.name.as_str()) {
            return Ok(());
        }
        let mut subscription = self.subscription.lock();
        if !self.event_names.lock().remove(&event.name) {
            return Ok(());
        }
        self.forget_event_state(std::slice::from_ref(&event.name));
        info!("공통 이벤트 감시 제거: {}", event.name);

        // 구독 갱신 실패 시 이전(상위 집합) 구독이 남는다
        if self.is_started() {
            if let Err(e) = self.create_subscription_locked(&mut subscription) {
                warn!("감시 제거 후 구독 갱신 실패: {e}");
            }
        }
        Ok(())
    }

    fn get_on_demand_reason_extra_data(&self, extra_data_id: i64) -> Option<OnDemandReasonExtraData> {
        self.store.get(extra_data_id)
    }
}

/// 구독 수신자: 플러그인이 해제되면 아무것도 하지 않는다
struct CommonEventSubscriber {
    collect: Weak<CommonEventCollect>,
}

impl CommonEventReceiver for CommonEventSubscriber {
    fn on_receive_event(&self, data: CommonEventData) {
        match self.collect.upgrade() {
            Some(collect) => collect.handle_event(data),
            None => error!("공통 이벤트 수집기 해제됨, 이벤트 무시: {}", data.action),
        }
    }
}

fn conditions_of(event: &OnDemandEvent) -> impl Iterator<Item = &OnDemandCondition> {
    event
        .conditions
        .iter()
        .filter(|condition| condition.event_id == EventCategory::CommonEvent)
}

/// 정수 파라미터 문자열 (없거나 정수가 아니면 "-1")
fn int_param(data: &CommonEventData, key: &str) -> String {
    match data.params.get(key) {
        Some(WantParam::Int(value)) => value.to_string(),
        _ => MISSING_FIELD_VALUE.to_string(),
    }
}
