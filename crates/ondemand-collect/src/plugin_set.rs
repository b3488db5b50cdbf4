//! 카테고리별 수집 플러그인 묶음.
//!
//! 카테고리마다 고정 슬롯을 두어 새 카테고리를 추가하면 `slot()`의
//! match가 컴파일 단계에서 누락을 잡는다.

use ondemand_core::error::CoreError;
use ondemand_core::models::event::EventCategory;
use ondemand_core::ports::collect::CollectPlugin;
use std::sync::Arc;

type Slot = Option<Arc<dyn CollectPlugin>>;

/// 카테고리 → 플러그인
#[derive(Default, Clone)]
pub struct PluginSet {
    device_online: Slot,
    setting_switch: Slot,
    param: Slot,
    common_event: Slot,
    timed_event: Slot,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 플러그인 등록: 같은 카테고리 중복 등록은 에러
    pub fn insert(&mut self, plugin: Arc<dyn CollectPlugin>) -> Result<(), CoreError> {
        let category = plugin.category();
        let slot = self.slot_mut(category);
        if slot.is_some() {
            return Err(CoreError::PluginAlreadyRegistered(category));
        }
        *slot = Some(plugin);
        Ok(())
    }

    /// 빌더 형태 등록
    pub fn with(mut self, plugin: Arc<dyn CollectPlugin>) -> Result<Self, CoreError> {
        self.insert(plugin)?;
        Ok(self)
    }

    /// 카테고리 플러그인 조회
    pub fn get(&self, category: EventCategory) -> Option<&Arc<dyn CollectPlugin>> {
        self.slot(category).as_ref()
    }

    pub fn contains(&self, category: EventCategory) -> bool {
        self.slot(category).is_some()
    }

    /// 등록된 플러그인 순회 (카테고리 ID 순)
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CollectPlugin>> {
        EventCategory::ALL
            .into_iter()
            .filter_map(move |category| self.get(category))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, category: EventCategory) -> &Slot {
        match category {
            EventCategory::DeviceOnline => &self.device_online,
            EventCategory::SettingSwitch => &self.setting_switch,
            EventCategory::Param => &self.param,
            EventCategory::CommonEvent => &self.common_event,
            EventCategory::TimedEvent => &self.timed_event,
        }
    }

    fn slot_mut(&mut self, category: EventCategory) -> &mut Slot {
        match category {
            EventCategory::DeviceOnline => &mut self.device_online,
            EventCategory::SettingSwitch => &mut self.setting_switch,
            EventCategory::Param => &mut self.param,
            EventCategory::CommonEvent => &mut self.common_event,
            EventCategory::TimedEvent => &mut self.timed_event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ondemand_core::models::profile::SaProfile;

    struct Dummy(EventCategory);

    impl CollectPlugin for Dummy {
        fn category(&self) -> EventCategory {
            self.0
        }

        fn init(&self, _profiles: &[SaProfile]) {}

        fn on_start(&self) -> Result<(), CoreError> {
            Ok(())
        }

        fn on_stop(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn insert_and_lookup_by_category() {
        let set = PluginSet::new()
            .with(Arc::new(Dummy(EventCategory::TimedEvent)))
            .unwrap()
            .with(Arc::new(Dummy(EventCategory::Param)))
            .unwrap();

        assert_eq!(set.len(), 2);
        assert!(set.contains(EventCategory::Param));
        assert!(set.get(EventCategory::CommonEvent).is_none());
        let order: Vec<EventCategory> = set.iter().map(|p| p.category()).collect();
        assert_eq!(order, vec![EventCategory::Param, EventCategory::TimedEvent]);
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let mut set = PluginSet::new();
        set.insert(Arc::new(Dummy(EventCategory::Param))).unwrap();
        assert_matches!(
            set.insert(Arc::new(Dummy(EventCategory::Param))),
            Err(CoreError::PluginAlreadyRegistered(EventCategory::Param))
        );
        assert!(PluginSet::new().is_empty());
    }
}
