//! 주기 타이머 수집 플러그인.
//!
//! 프로파일의 `loopevent` 항목 값(초)마다 반복 타이머를 상관기 큐에 걸고,
//! 만료될 때마다 `{TimedEvent, "loopevent", 주기}` 이벤트를 보고한다.

use ondemand_core::error::CoreError;
use ondemand_core::models::event::{EventCategory, OnDemandEvent};
use ondemand_core::models::profile::SaProfile;
use ondemand_core::ports::collect::CollectPlugin;
use ondemand_core::ports::reporter::Reporter;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 반복 타이머 이벤트 이름
pub const LOOP_EVENT: &str = "loopevent";

/// 반복 타이머 플러그인
pub struct DeviceTimedCollect {
    reporter: Arc<dyn Reporter>,
    /// 등록된 주기 (초)
    intervals: Mutex<BTreeSet<u64>>,
    started: AtomicBool,
    /// 중지마다 증가: 이전 세대의 타이머는 스스로 끝난다
    generation: AtomicU64,
    this: Weak<DeviceTimedCollect>,
}

impl DeviceTimedCollect {
    pub fn new(reporter: Arc<dyn Reporter>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            reporter,
            intervals: Mutex::new(BTreeSet::new()),
            started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    /// 등록된 주기 목록 (초, 오름차순)
    pub fn intervals(&self) -> Vec<u64> {
        self.intervals.lock().iter().copied().collect()
    }

    /// 새로 등록된 주기만 반환
    fn register(&self, events: &[&OnDemandEvent]) -> Vec<u64> {
        let mut intervals = self.intervals.lock();
        events
            .iter()
            .filter(|event| event.event_id == EventCategory::TimedEvent && event.name == LOOP_EVENT)
            .filter_map(|event| match parse_interval(&event.value) {
                Some(secs) => Some(secs),
                None => {
                    warn!("잘못된 타이머 주기 무시: {:?}", event.value);
                    None
                }
            })
            .filter(|secs| intervals.insert(*secs))
            .collect()
    }

    fn schedule(&self, interval: u64, generation: u64) {
        let weak = self.this.clone();
        let posted = self.reporter.post_delay_task(
            Box::new(move || {
                if let Some(collect) = weak.upgrade() {
                    collect.fire(interval, generation);
                }
            }),
            Duration::from_secs(interval),
        );
        if !posted {
            warn!("타이머 예약 실패: {interval}s");
        }
    }

    fn fire(&self, interval: u64, generation: u64) {
        if !self.started.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
            || !self.intervals.lock().contains(&interval)
        {
            debug!("지난 타이머 종료: {interval}s");
            return;
        }
        self.reporter.report_event(OnDemandEvent::new(
            EventCategory::TimedEvent,
            LOOP_EVENT,
            interval.to_string(),
        ));
        self.schedule(interval, generation);
    }
}

impl CollectPlugin for DeviceTimedCollect {
    fn category(&self) -> EventCategory {
        EventCategory::TimedEvent
    }

    fn init(&self, profiles: &[SaProfile]) {
        let events: Vec<&OnDemandEvent> =
            profiles.iter().flat_map(|profile| profile.all_events()).collect();
        self.register(&events);
    }

    fn on_start(&self) -> Result<(), CoreError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let intervals = self.intervals();
        info!("타이머 수집 시작: {intervals:?}");
        for interval in intervals {
            self.schedule(interval, generation);
        }
        Ok(())
    }

    fn on_stop(&self) -> Result<(), CoreError> {
        if self.started.swap(false, Ordering::SeqCst) {
            self.generation.fetch_add(1, Ordering::SeqCst);
            info!("타이머 수집 중지");
        }
        Ok(())
    }

    fn add_collect_event(&self, events: &[OnDemandEvent]) -> Result<(), CoreError> {
        let events: Vec<&OnDemandEvent> = events.iter().collect();
        let added = self.register(&events);
        if self.started.load(Ordering::SeqCst) {
            let generation = self.generation.load(Ordering::SeqCst);
            for interval in added {
                self.schedule(interval, generation);
            }
        }
        Ok(())
    }

    fn remove_unused_event(&self, event: &OnDemandEvent) -> Result<(), CoreError> {
        if event.name != LOOP_EVENT {
            return Ok(());
        }
        if let Some(secs) = parse_interval(&event.value) {
            self.intervals.lock().remove(&secs);
        }
        Ok(())
    }
}

fn parse_interval(value: &str) -> Option<u64> {
    value.parse::<u64>().ok().filter(|secs| *secs > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ondemand_core::ports::reporter::Task;

    #[derive(Default)]
    struct ManualReporter {
        events: Mutex<Vec<OnDemandEvent>>,
        delayed: Mutex<Vec<(Task, Duration)>>,
    }

    impl ManualReporter {
        /// 대기 중인 타이머를 한 번씩 실행하고 실행한 지연 목록 반환
        fn fire_pending(&self) -> Vec<Duration> {
            let pending: Vec<(Task, Duration)> = std::mem::take(&mut *self.delayed.lock());
            pending
                .into_iter()
                .map(|(task, delay)| {
                    task();
                    delay
                })
                .collect()
        }
    }

    impl Reporter for ManualReporter {
        fn report_event(&self, event: OnDemandEvent) {
            self.events.lock().push(event);
        }

        fn post_task(&self, task: Task) -> bool {
            task();
            true
        }

        fn post_delay_task(&self, task: Task, delay: Duration) -> bool {
            self.delayed.lock().push((task, delay));
            true
        }
    }

    fn loop_event(value: &str) -> OnDemandEvent {
        OnDemandEvent::new(EventCategory::TimedEvent, LOOP_EVENT, value)
    }

    #[test]
    fn init_keeps_positive_integer_intervals() {
        let collect = DeviceTimedCollect::new(Arc::new(ManualReporter::default()));
        let profile = SaProfile::new(1001, "p")
            .with_start_event(loop_event("60"))
            .with_start_event(loop_event("0"))
            .with_start_event(loop_event("abc"))
            .with_stop_event(loop_event("30"));
        collect.init(&[profile]);
        assert_eq!(collect.intervals(), vec![30, 60]);
    }

    #[test]
    fn loop_reports_and_reschedules_while_started() {
        let reporter = Arc::new(ManualReporter::default());
        let collect = DeviceTimedCollect::new(reporter.clone());
        collect.init(&[SaProfile::new(1, "p").with_start_event(loop_event("10"))]);
        collect.on_start().unwrap();

        assert_eq!(reporter.fire_pending(), vec![Duration::from_secs(10)]);
        assert_eq!(reporter.fire_pending(), vec![Duration::from_secs(10)]);
        let events = reporter.events.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], loop_event("10"));

        collect.on_stop().unwrap();
        reporter.fire_pending();
        assert_eq!(reporter.events.lock().len(), 2);
        assert!(reporter.delayed.lock().is_empty());
    }

    #[test]
    fn added_interval_starts_immediately_when_running() {
        let reporter = Arc::new(ManualReporter::default());
        let collect = DeviceTimedCollect::new(reporter.clone());
        collect.on_start().unwrap();

        collect.add_collect_event(&[loop_event("5")]).unwrap();
        collect.add_collect_event(&[loop_event("5")]).unwrap();
        assert_eq!(reporter.delayed.lock().len(), 1);

        collect.remove_unused_event(&loop_event("5")).unwrap();
        reporter.fire_pending();
        assert!(reporter.events.lock().is_empty());
    }

    #[test]
    fn restart_drops_previous_generation() {
        let reporter = Arc::new(ManualReporter::default());
        let collect = DeviceTimedCollect::new(reporter.clone());
        collect.init(&[SaProfile::new(1, "p").with_start_event(loop_event("1"))]);

        collect.on_start().unwrap();
        collect.on_stop().unwrap();
        collect.on_stop().unwrap();
        collect.on_start().unwrap();

        // 이전 세대 1개 + 새 세대 1개 → 새 세대만 보고
        reporter.fire_pending();
        assert_eq!(reporter.events.lock().len(), 1);
        assert_eq!(reporter.delayed.lock().len(), 1);
    }
}
