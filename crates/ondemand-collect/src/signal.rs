//! 백그라운드 스레드 정지 신호.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 조건 변수 기반 정지 신호
///
/// 백그라운드 스레드는 `wait_for`로 잠들고, 정지 요청 시 즉시 깨어난다.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 정지 요청 후 대기 중인 스레드를 모두 깨운다
    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    /// 재사용을 위해 정지 상태 해제
    pub(crate) fn reset(&self) {
        *self.stopped.lock() = false;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// 최대 `timeout` 동안 대기. 정지 요청으로 깨어났으면 true
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn wait_times_out_without_stop() {
        let signal = StopSignal::new();
        assert!(!signal.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn stop_wakes_waiter_early() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = signal.clone();
            std::thread::spawn(move || {
                let begin = Instant::now();
                let stopped = signal.wait_for(Duration::from_secs(30));
                (stopped, begin.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        signal.stop();
        let (stopped, elapsed) = waiter.join().unwrap();
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(30));

        signal.reset();
        assert!(!signal.is_stopped());
    }
}
