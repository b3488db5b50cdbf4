//! 디바이스 상태 수집 관리자 (이벤트 상관기).
//!
//! 수집 플러그인이 보고한 이벤트를 온디맨드 프로파일과 대조해
//! 서비스별 시작/중지 결정을 만들고, 그 결정을 스케줄러에 비동기로 넘긴다.
//!
//! # 잠금 규칙
//! - 프로파일 목록은 `RwLock`으로 보호한다. 상관 계산은 읽기 락, 정책 갱신은 쓰기 락
//! - 플러그인 호출(`add_collect_event`, `remove_unused_event`, `on_start`, `on_stop`)은
//!   프로파일 락 밖에서 한다
//! - 스케줄러 디스패치는 별도 큐 작업으로 게시하며 어떤 락도 잡지 않는다

use ondemand_core::config::EngineConfig;
use ondemand_core::config_manager::ConfigManager;
use ondemand_core::error::CoreError;
use ondemand_core::models::control::SaControlInfo;
use ondemand_core::models::event::{EventCategory, OnDemandEvent};
use ondemand_core::models::extra_data::OnDemandReasonExtraData;
use ondemand_core::models::profile::{validate_event, OnDemandPolicyType, SaProfile};
use ondemand_core::ports::collect::CollectPlugin;
use ondemand_core::ports::common_event::CommonEventService;
use ondemand_core::ports::ipc::IpcThreadControl;
use ondemand_core::ports::monitor::LoadSampler;
use ondemand_core::ports::reporter::{Reporter, Task};
use ondemand_core::ports::scheduler::OnDemandScheduler;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::common_event::CommonEventCollect;
use crate::extra_data::ExtraDataStore;
use crate::networking::DeviceNetworkingCollect;
use crate::plugin_set::PluginSet;
use crate::state_collect::StateCollect;
use crate::task_queue::TaskQueue;
use crate::timed::DeviceTimedCollect;

/// 기본 플러그인 구성에 필요한 외부 협력자
pub struct CollectServices {
    /// 브로드캐스트 구독 서비스
    pub common_event: Arc<dyn CommonEventService>,
    /// 유휴 IPC 스레드 회수 (없으면 회수 기능 생략)
    pub ipc: Option<Arc<dyn IpcThreadControl>>,
    /// CPU 부하 샘플러 (없으면 CPU 유휴 감지 생략)
    pub load_sampler: Option<Arc<dyn LoadSampler>>,
}

/// `init_default()`가 만든 플러그인 핸들: 외부 감시자가 값을 밀어 넣을 때 사용
#[derive(Clone)]
pub struct DefaultPlugins {
    pub common_event: Arc<CommonEventCollect>,
    pub param: Arc<StateCollect>,
    pub setting_switch: Arc<StateCollect>,
    pub networking: Arc<DeviceNetworkingCollect>,
    pub timed: Arc<DeviceTimedCollect>,
}

/// 이벤트 상관기
pub struct DeviceStatusCollectManager {
    config: EngineConfig,
    scheduler: Arc<dyn OnDemandScheduler>,
    /// 상관 계산·디스패치·플러그인 시작 작업 큐
    queue: TaskQueue,
    /// 부가 데이터 만료 작업 큐
    extra_data_queue: TaskQueue,
    store: Arc<ExtraDataStore>,
    profiles: RwLock<Vec<SaProfile>>,
    plugins: RwLock<Option<PluginSet>>,
    this: Weak<DeviceStatusCollectManager>,
}

impl DeviceStatusCollectManager {
    /// 새 상관기 생성 (tokio 런타임 안에서 호출해야 큐가 동작한다)
    pub fn new(config: EngineConfig, scheduler: Arc<dyn OnDemandScheduler>) -> Arc<Self> {
        let extra_data_queue = TaskQueue::new("extra_data");
        let store = ExtraDataStore::new(extra_data_queue.clone(), &config.extra_data);
        Arc::new_cyclic(|this| Self {
            config,
            scheduler,
            queue: TaskQueue::new("collect"),
            extra_data_queue,
            store,
            profiles: RwLock::new(Vec::new()),
            plugins: RwLock::new(None),
            this: this.clone(),
        })
    }

    /// 설정 파일로 상관기 생성
    ///
    /// 파일이 없으면 기본 설정 파일을 만든다. 읽기나 검증에 실패하면 에러.
    pub fn from_config_file(
        config_path: impl Into<PathBuf>,
        scheduler: Arc<dyn OnDemandScheduler>,
    ) -> Result<Arc<Self>, CoreError> {
        let config_manager = ConfigManager::with_path(config_path.into())?;
        info!("상관기 설정 로드: {}", config_manager.config_path().display());
        Ok(Self::new(config_manager.get(), scheduler))
    }

    /// 플러그인이 보고에 사용할 핸들
    pub fn reporter(&self) -> Arc<dyn Reporter> {
        Arc::new(CollectReporter {
            queue: self.queue.clone(),
            manager: self.this.clone(),
        })
    }

    /// 부가 데이터 저장소 (사용자 정의 플러그인 구성용)
    pub fn extra_data_store(&self) -> Arc<ExtraDataStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 프로파일 로드, 플러그인 초기화, 수집 시작 예약
    pub fn init(&self, profiles: &[SaProfile], plugins: PluginSet) -> Result<(), CoreError> {
        if !self.queue.is_available() {
            return Err(CoreError::QueueUnavailable(self.queue.name().to_string()));
        }
        let filtered = Self::filter_on_demand_profiles(profiles);
        {
            let mut slot = self.plugins.write();
            if slot.is_some() {
                return Err(CoreError::AlreadyInitialized);
            }
            for plugin in plugins.iter() {
                plugin.init(&filtered);
            }
            *slot = Some(plugins.clone());
        }
        info!(
            "상관기 초기화: 프로파일 {}/{}개, 플러그인 {}개",
            filtered.len(),
            profiles.len(),
            plugins.len()
        );
        *self.profiles.write() = filtered;

        self.start_collect(&plugins);
        Ok(())
    }

    /// 기본 플러그인 5종으로 초기화
    pub fn init_default(
        &self,
        profiles: &[SaProfile],
        services: CollectServices,
    ) -> Result<DefaultPlugins, CoreError> {
        let reporter = self.reporter();
        let handles = DefaultPlugins {
            common_event: CommonEventCollect::new(
                reporter.clone(),
                services.common_event,
                self.store.clone(),
                services.ipc,
                services.load_sampler,
                &self.config,
            ),
            param: StateCollect::param(reporter.clone()),
            setting_switch: StateCollect::setting_switch(reporter.clone()),
            networking: DeviceNetworkingCollect::new(reporter.clone()),
            timed: DeviceTimedCollect::new(reporter),
        };

        let plugins = PluginSet::new()
            .with(handles.networking.clone())?
            .with(handles.setting_switch.clone())?
            .with(handles.param.clone())?
            .with(handles.common_event.clone())?
            .with(handles.timed.clone())?;
        self.init(profiles, plugins)?;
        Ok(handles)
    }

    /// 온디맨드 이벤트가 있는 유효 프로파일만 남긴다
    ///
    /// 검증에 실패한 프로파일은 경고 후 버린다.
    pub fn filter_on_demand_profiles(profiles: &[SaProfile]) -> Vec<SaProfile> {
        profiles
            .iter()
            .filter(|profile| match profile.validate() {
                Ok(()) => profile.has_on_demand_events(),
                Err(e) => {
                    warn!("프로파일 거부: {e}");
                    false
                }
            })
            .cloned()
            .collect()
    }

    /// 보고된 이벤트 → 서비스별 제어 결정
    ///
    /// 프로파일마다 시작/중지 목록을 각각 훑어 처음 일치한 항목 하나만 채택한다.
    pub fn get_sa_control_list_by_event(&self, event: &OnDemandEvent) -> Vec<SaControlInfo> {
        let profiles = self.profiles.read();
        let mut controls = Vec::new();
        for profile in profiles.iter() {
            if let Some(entry) = self.first_match(profile.events(OnDemandPolicyType::Start), event) {
                controls.push(SaControlInfo::start(profile.sa_id, entry.enable_once));
            }
            if let Some(entry) = self.first_match(profile.events(OnDemandPolicyType::Stop), event) {
                controls.push(SaControlInfo::stop(profile.sa_id, entry.enable_once));
            }
        }
        controls
    }

    /// 조건 AND 평가 (첫 실패에서 중단, 플러그인 없는 카테고리는 실패)
    pub fn check_conditions(&self, template: &OnDemandEvent) -> bool {
        template.conditions.iter().all(|condition| {
            let Some(plugin) = self.plugin(condition.event_id) else {
                warn!("조건 카테고리 플러그인 없음: {}", condition.event_id);
                return false;
            };
            let satisfied = plugin.check_condition(condition);
            if !satisfied {
                debug!("조건 불충족: {} {}", condition.event_id, condition.name);
            }
            satisfied
        })
    }

    /// 이벤트 보고: 상관 계산을 큐에 게시하고 즉시 반환
    pub fn report_event(&self, event: OnDemandEvent) {
        let weak = self.this.clone();
        let posted = self.queue.post(Box::new(move || {
            if let Some(manager) = weak.upgrade() {
                manager.handle_reported_event(event);
            }
        }));
        if !posted {
            warn!("상관 작업 게시 실패 (큐 종료)");
        }
    }

    pub fn post_task(&self, task: Task) -> bool {
        self.queue.post(task)
    }

    pub fn post_delay_task(&self, task: Task, delay: Duration) -> bool {
        self.queue.post_delayed(task, delay)
    }

    /// 부가 데이터 조회 (공통 이벤트 플러그인 경유)
    pub fn get_on_demand_reason_extra_data(
        &self,
        extra_data_id: i64,
    ) -> Option<OnDemandReasonExtraData> {
        self.plugin(EventCategory::CommonEvent)?
            .get_on_demand_reason_extra_data(extra_data_id)
    }

    /// 새 이벤트 이름을 담당 플러그인에 등록
    ///
    /// 이벤트 카테고리에 플러그인이 없으면 아무것도 등록하지 않고 실패한다.
    /// 조건은 자기 카테고리 플러그인에도 전달된다. 중간에 플러그인 하나가
    /// 실패하면 이번 호출로 생긴 감시 중 어떤 프로파일도 쓰지 않는 것을 되돌린다.
    pub fn add_collect_events(&self, events: &[OnDemandEvent]) -> Result<(), CoreError> {
        let plugins = self.plugin_set();
        if let Some(missing) = events
            .iter()
            .map(|event| event.event_id)
            .find(|category| !plugins.contains(*category))
        {
            error!("지원하지 않는 이벤트 카테고리: {missing}");
            return Err(CoreError::UnsupportedCategory(missing));
        }

        let mut grouped: BTreeMap<EventCategory, Vec<OnDemandEvent>> = BTreeMap::new();
        for event in events {
            let mut targets = BTreeSet::from([event.event_id]);
            targets.extend(
                event
                    .conditions
                    .iter()
                    .map(|condition| condition.event_id)
                    .filter(|category| plugins.contains(*category)),
            );
            for category in targets {
                grouped.entry(category).or_default().push(event.clone());
            }
        }

        for (category, group) in grouped {
            let Some(plugin) = plugins.get(category) else {
                continue;
            };
            if let Err(e) = plugin.add_collect_event(&group) {
                error!("감시 이벤트 등록 실패 {category}: {e}, 롤백");
                self.release_unused_events(events);
                return Err(e);
            }
        }
        Ok(())
    }

    /// 서비스의 정책별 이벤트 목록
    pub fn get_on_demand_events(
        &self,
        sa_id: i32,
        policy: OnDemandPolicyType,
    ) -> Result<Vec<OnDemandEvent>, CoreError> {
        self.profiles
            .read()
            .iter()
            .find(|profile| profile.sa_id == sa_id)
            .map(|profile| profile.events(policy).to_vec())
            .ok_or(CoreError::ProfileNotFound(sa_id))
    }

    /// 서비스의 정책별 이벤트 목록 교체
    ///
    /// 모든 이벤트를 플러그인에 먼저 등록하고, 하나라도 실패하면 기존 상태를 유지한다.
    pub fn update_on_demand_events(
        &self,
        sa_id: i32,
        policy: OnDemandPolicyType,
        events: Vec<OnDemandEvent>,
    ) -> Result<(), CoreError> {
        if !self.profiles.read().iter().any(|profile| profile.sa_id == sa_id) {
            return Err(CoreError::ProfileNotFound(sa_id));
        }
        for event in &events {
            validate_event(event).map_err(|message| CoreError::Validation {
                field: "on_demand_events".to_string(),
                message,
            })?;
        }
        self.add_collect_events(&events)?;

        let previous = {
            let mut profiles = self.profiles.write();
            let profile = profiles
                .iter_mut()
                .find(|profile| profile.sa_id == sa_id)
                .ok_or(CoreError::ProfileNotFound(sa_id))?;
            std::mem::replace(profile.events_mut(policy), events)
        };
        info!("온디맨드 정책 갱신: SA={sa_id}, {policy:?}");

        self.release_unused_events(&previous);
        Ok(())
    }

    /// 영구 해제된 서비스 프로파일과 부가 데이터 역색인 제거
    pub fn remove_profile(&self, sa_id: i32) -> bool {
        let removed = {
            let mut profiles = self.profiles.write();
            let position = profiles.iter().position(|profile| profile.sa_id == sa_id);
            position.map(|pos| profiles.remove(pos))
        };
        let Some(profile) = removed else {
            return false;
        };
        info!("프로파일 제거: SA={sa_id}");
        self.store.clear_service(sa_id);

        let events: Vec<OnDemandEvent> = profile.all_events().cloned().collect();
        self.release_unused_events(&events);
        true
    }

    /// 서비스에 연결된 부가 데이터 ID 목록 (이벤트 이름 필터는 빈 문자열이면 생략)
    pub fn get_sa_extra_data_id_list(&self, sa_id: i32, event_name: &str) -> Vec<i64> {
        self.store.list_for_service(sa_id, event_name)
    }

    pub fn clear_sa_extra_data_id(&self, sa_id: i32) {
        self.store.clear_service(sa_id);
    }

    /// 상관 결과로 매칭된 서비스들에 이벤트 부가 데이터 ID 연결
    pub fn save_cache_common_event_sa_extra_id(
        &self,
        event: &OnDemandEvent,
        controls: &[SaControlInfo],
    ) {
        if !event.has_extra_data() {
            return;
        }
        let sa_ids: BTreeSet<i32> = controls.iter().map(|control| control.sa_id).collect();
        let sa_ids: Vec<i32> = sa_ids.into_iter().collect();
        self.store.index_for_services(event.extra_data_id, &sa_ids);
    }

    /// 보관 중인 프로파일의 saId 목록
    pub fn sa_ids(&self) -> Vec<i32> {
        self.profiles
            .read()
            .iter()
            .map(|profile| profile.sa_id)
            .collect()
    }

    /// 플러그인 전체 중지 후 큐 종료
    pub fn uninit(&self) {
        let plugins = self.plugins.write().take();
        if let Some(plugins) = plugins {
            for plugin in plugins.iter() {
                if let Err(e) = plugin.on_stop() {
                    warn!("플러그인 중지 실패 {}: {e}", plugin.category());
                }
            }
        }
        self.queue.shutdown();
        self.extra_data_queue.shutdown();
        info!("상관기 종료");
    }

    fn handle_reported_event(&self, event: OnDemandEvent) {
        let controls = self.get_sa_control_list_by_event(&event);
        if controls.is_empty() {
            debug!("일치하는 온디맨드 이벤트 없음: {} {}", event.event_id, event.name);
            return;
        }
        self.save_cache_common_event_sa_extra_id(&event, &controls);

        let scheduler = self.scheduler.clone();
        let posted = self.queue.post(Box::new(move || {
            scheduler.process_on_demand_event(&event, &controls);
        }));
        if !posted {
            warn!("디스패치 게시 실패 (큐 종료)");
        }
    }

    /// 템플릿 목록에서 처음으로 채택되는 항목
    ///
    /// 이름·값 일치와 조건 AND에 더해 템플릿의 부가 필드 관계식
    /// (`check_extra_message`)까지 통과해야 채택된다.
    fn first_match<'a>(
        &self,
        templates: &'a [OnDemandEvent],
        event: &OnDemandEvent,
    ) -> Option<&'a OnDemandEvent> {
        templates.iter().find(|template| {
            template.matches(event)
                && self.check_conditions(template)
                && self.check_extra_message(event, template)
        })
    }

    fn check_extra_message(&self, event: &OnDemandEvent, template: &OnDemandEvent) -> bool {
        if template.extra_messages.is_empty() {
            return true;
        }
        match self.plugin(event.event_id) {
            Some(plugin) => plugin.check_extra_message(event.extra_data_id, template),
            None => false,
        }
    }

    /// 더 이상 어떤 프로파일도 참조하지 않는 감시를 플러그인에서 해제
    ///
    /// 후보 이벤트 자신과 그 조건을 모두 본다. 살아 있는 프로파일의 이벤트나
    /// 조건이 같은 감시 키를 쓰면 남긴다.
    fn release_unused_events(&self, candidates: &[OnDemandEvent]) {
        let unused: Vec<OnDemandEvent> = {
            let profiles = self.profiles.read();
            let live: BTreeSet<WatchKey> = profiles
                .iter()
                .flat_map(|profile| profile.all_events())
                .flat_map(watch_targets)
                .map(|event| WatchKey::of(&event))
                .collect();
            let mut seen = BTreeSet::new();
            candidates
                .iter()
                .flat_map(watch_targets)
                .filter(|event| {
                    let key = WatchKey::of(event);
                    !live.contains(&key) && seen.insert(key)
                })
                .collect()
        };

        for event in unused {
            let Some(plugin) = self.plugin(event.event_id) else {
                continue;
            };
            if let Err(e) = plugin.remove_unused_event(&event) {
                warn!("감시 이벤트 해제 실패 {}: {e}", event.name);
            }
        }
    }

    fn start_collect(&self, plugins: &PluginSet) {
        for plugin in plugins.iter() {
            let plugin = plugin.clone();
            let posted = self.queue.post(Box::new(move || {
                if let Err(e) = plugin.on_start() {
                    error!("플러그인 시작 실패 {}: {e}", plugin.category());
                }
            }));
            if !posted {
                warn!("플러그인 시작 게시 실패");
            }
        }
    }

    fn plugin(&self, category: EventCategory) -> Option<Arc<dyn CollectPlugin>> {
        self.plugins.read().as_ref()?.get(category).cloned()
    }

    fn plugin_set(&self) -> PluginSet {
        self.plugins.read().clone().unwrap_or_default()
    }
}

/// 플러그인 감시 단위
///
/// 타이머는 주기마다 따로 돌기 때문에 값까지 구분하고,
/// 나머지 카테고리는 이름 단위로 감시한다.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct WatchKey {
    category: EventCategory,
    name: String,
    value: String,
}

impl WatchKey {
    fn of(event: &OnDemandEvent) -> Self {
        let value = match event.event_id {
            EventCategory::TimedEvent => event.value.clone(),
            _ => String::new(),
        };
        Self {
            category: event.event_id,
            name: event.name.clone(),
            value,
        }
    }
}

/// 이벤트 자신과 조건 각각을 감시 대상 이벤트로 펼친다
fn watch_targets(event: &OnDemandEvent) -> Vec<OnDemandEvent> {
    std::iter::once(OnDemandEvent::new(event.event_id, event.name.clone(), event.value.clone()))
        .chain(event.conditions.iter().map(|condition| {
            OnDemandEvent::new(condition.event_id, condition.name.clone(), condition.value.clone())
        }))
        .collect()
}

/// 플러그인 → 상관기 상향 호출 핸들
///
/// 상관기가 해제되면 보고는 조용히 버려진다.
struct CollectReporter {
    queue: TaskQueue,
    manager: Weak<DeviceStatusCollectManager>,
}

impl Reporter for CollectReporter {
    fn report_event(&self, event: OnDemandEvent) {
        match self.manager.upgrade() {
            Some(manager) => manager.report_event(event),
            None => debug!("상관기 해제됨, 보고 무시: {}", event.name),
        }
    }

    fn post_task(&self, task: Task) -> bool {
        self.queue.post(task)
    }

    fn post_delay_task(&self, task: Task, delay: Duration) -> bool {
        self.queue.post_delayed(task, delay)
    }
}
