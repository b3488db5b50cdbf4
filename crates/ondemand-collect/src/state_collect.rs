//! 값 캐시형 수집 플러그인 (시스템 파라미터, 설정 스위치).
//!
//! 외부 감시자가 `update_value()`로 값을 밀어 넣으면 캐시를 갱신하고,
//! 감시 중인 이름이면 이벤트로 보고한다.

use ondemand_core::error::CoreError;
use ondemand_core::models::event::{EventCategory, OnDemandCondition, OnDemandEvent};
use ondemand_core::models::profile::SaProfile;
use ondemand_core::ports::collect::CollectPlugin;
use ondemand_core::ports::reporter::Reporter;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 이름 → 값 캐시 기반 수집 플러그인
pub struct StateCollect {
    category: EventCategory,
    reporter: Arc<dyn Reporter>,
    watched: Mutex<BTreeSet<String>>,
    values: Mutex<HashMap<String, String>>,
    started: AtomicBool,
}

impl StateCollect {
    /// 시스템 파라미터 플러그인
    pub fn param(reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new(Self::new(EventCategory::Param, reporter))
    }

    /// 설정 스위치 플러그인
    pub fn setting_switch(reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new(Self::new(EventCategory::SettingSwitch, reporter))
    }

    fn new(category: EventCategory, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            category,
            reporter,
            watched: Mutex::new(BTreeSet::new()),
            values: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// 값 변경 알림
    pub fn update_value(&self, name: &str, value: &str) {
        self.values
            .lock()
            .insert(name.to_string(), value.to_string());

        if !self.started.load(Ordering::SeqCst) || !self.watched.lock().contains(name) {
            return;
        }
        debug!("{} 값 변경 보고: {name}={value}", self.category);
        self.reporter
            .report_event(OnDemandEvent::new(self.category, name, value));
    }

    /// 캐시된 현재 값
    pub fn value(&self, name: &str) -> Option<String> {
        self.values.lock().get(name).cloned()
    }

    /// 감시 중인 이름인지
    pub fn is_watched(&self, name: &str) -> bool {
        self.watched.lock().contains(name)
    }

    fn watch(&self, events: &[&OnDemandEvent]) {
        let mut watched = self.watched.lock();
        for event in events {
            if event.event_id == self.category {
                watched.insert(event.name.clone());
            }
            for condition in &event.conditions {
                if condition.event_id == self.category {
                    watched.insert(condition.name.clone());
                }
            }
        }
    }
}

impl CollectPlugin for StateCollect {
    fn category(&self) -> EventCategory {
        self.category
    }

    fn init(&self, profiles: &[SaProfile]) {
        let events: Vec<&OnDemandEvent> =
            profiles.iter().flat_map(|profile| profile.all_events()).collect();
        self.watch(&events);
    }

    fn on_start(&self) -> Result<(), CoreError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("{} 수집 시작 (감시 {}개)", self.category, self.watched.lock().len());
        }
        Ok(())
    }

    fn on_stop(&self) -> Result<(), CoreError> {
        if self.started.swap(false, Ordering::SeqCst) {
            info!("{} 수집 중지", self.category);
        }
        Ok(())
    }

    fn check_condition(&self, condition: &OnDemandCondition) -> bool {
        match self.values.lock().get(&condition.name) {
            Some(value) => condition.value.is_empty() || *value == condition.value,
            None => false,
        }
    }

    fn add_collect_event(&self, events: &[OnDemandEvent]) -> Result<(), CoreError> {
        let events: Vec<&OnDemandEvent> = events.iter().collect();
        self.watch(&events);
        Ok(())
    }

    fn remove_unused_event(&self, event: &OnDemandEvent) -> Result<(), CoreError> {
        if self.watched.lock().remove(&event.name) {
            debug!("{} 감시 제거: {}", self.category, event.name);
        }
        Ok(())
    }
}
