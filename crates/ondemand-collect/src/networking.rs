//! 원격 디바이스 온라인 상태 수집 플러그인.

use ondemand_core::error::CoreError;
use ondemand_core::models::event::{EventCategory, OnDemandCondition, OnDemandEvent};
use ondemand_core::models::profile::SaProfile;
use ondemand_core::ports::collect::CollectPlugin;
use ondemand_core::ports::reporter::Reporter;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// 보고 이벤트 이름
pub const DEVICE_ONLINE_EVENT: &str = "deviceonline";
pub const ONLINE: &str = "on";
pub const OFFLINE: &str = "off";

/// 온라인 디바이스 집합을 추적하는 플러그인
pub struct DeviceNetworkingCollect {
    reporter: Arc<dyn Reporter>,
    online: Mutex<BTreeSet<String>>,
    started: AtomicBool,
}

impl DeviceNetworkingCollect {
    pub fn new(reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new(Self {
            reporter,
            online: Mutex::new(BTreeSet::new()),
            started: AtomicBool::new(false),
        })
    }

    /// 디바이스 온라인 알림: 첫 디바이스일 때만 보고
    pub fn on_device_online(&self, device_id: &str) {
        let first = {
            let mut online = self.online.lock();
            online.insert(device_id.to_string()) && online.len() == 1
        };
        debug!("디바이스 온라인: {device_id}");
        if first {
            self.report(ONLINE);
        }
    }

    /// 디바이스 오프라인 알림: 마지막 디바이스일 때만 보고
    pub fn on_device_offline(&self, device_id: &str) {
        let last = {
            let mut online = self.online.lock();
            online.remove(device_id) && online.is_empty()
        };
        debug!("디바이스 오프라인: {device_id}");
        if last {
            self.report(OFFLINE);
        }
    }

    /// 온라인 디바이스가 하나라도 있는지
    pub fn is_any_online(&self) -> bool {
        !self.online.lock().is_empty()
    }

    fn report(&self, value: &str) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.reporter.report_event(OnDemandEvent::new(
            EventCategory::DeviceOnline,
            DEVICE_ONLINE_EVENT,
            value,
        ));
    }
}

impl CollectPlugin for DeviceNetworkingCollect {
    fn category(&self) -> EventCategory {
        EventCategory::DeviceOnline
    }

    fn init(&self, _profiles: &[SaProfile]) {}

    fn on_start(&self) -> Result<(), CoreError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("디바이스 네트워킹 수집 시작");
        }
        Ok(())
    }

    fn on_stop(&self) -> Result<(), CoreError> {
        if self.started.swap(false, Ordering::SeqCst) {
            info!("디바이스 네트워킹 수집 중지");
        }
        Ok(())
    }

    fn check_condition(&self, condition: &OnDemandCondition) -> bool {
        match condition.value.as_str() {
            ONLINE => self.is_any_online(),
            OFFLINE => !self.is_any_online(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondemand_core::ports::reporter::Task;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingReporter {
        values: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn report_event(&self, event: OnDemandEvent) {
            self.values.lock().push(event.value);
        }

        fn post_task(&self, _task: Task) -> bool {
            true
        }

        fn post_delay_task(&self, _task: Task, _delay: Duration) -> bool {
            true
        }
    }

    #[test]
    fn reports_first_online_and_last_offline() {
        let reporter = Arc::new(RecordingReporter::default());
        let collect = DeviceNetworkingCollect::new(reporter.clone());
        collect.on_start().unwrap();

        collect.on_device_online("a");
        collect.on_device_online("b");
        collect.on_device_offline("a");
        collect.on_device_offline("b");
        collect.on_device_offline("b");

        assert_eq!(*reporter.values.lock(), vec!["on".to_string(), "off".to_string()]);
    }

    #[test]
    fn condition_tracks_online_set() {
        let collect = DeviceNetworkingCollect::new(Arc::new(RecordingReporter::default()));
        let on = OnDemandCondition::new(EventCategory::DeviceOnline, DEVICE_ONLINE_EVENT, "on");
        let off = OnDemandCondition::new(EventCategory::DeviceOnline, DEVICE_ONLINE_EVENT, "off");

        assert!(!collect.check_condition(&on));
        assert!(collect.check_condition(&off));
        collect.on_device_online("a");
        assert!(collect.check_condition(&on));
        assert!(!collect.check_condition(&off));
    }

    #[test]
    fn nothing_reported_before_start() {
        let reporter = Arc::new(RecordingReporter::default());
        let collect = DeviceNetworkingCollect::new(reporter.clone());
        collect.on_device_online("a");
        assert!(reporter.values.lock().is_empty());
        collect.on_stop().unwrap();
        collect.on_stop().unwrap();
    }
}
