//! 유휴 IPC 스레드 회수 디바운스.
//!
//! 화면 꺼짐 등으로 예약되면 `delay` 동안 `step` 간격으로 취소 여부를 확인하고,
//! 취소되지 않으면 IPC 스레드 풀에 회수를 요청한다. 한 번에 한 사이클만 돈다.

use ondemand_core::ports::ipc::IpcThreadControl;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::signal::StopSignal;

struct ReclaimState {
    ipc: Arc<dyn IpcThreadControl>,
    running: AtomicBool,
    cancelled: AtomicBool,
    stop: StopSignal,
}

/// 유휴 IPC 스레드 회수 디바운서
pub struct IdleThreadReclaimer {
    state: Arc<ReclaimState>,
    delay: Duration,
    step: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IdleThreadReclaimer {
    pub fn new(ipc: Arc<dyn IpcThreadControl>, delay: Duration, step: Duration) -> Self {
        Self {
            state: Arc::new(ReclaimState {
                ipc,
                running: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                stop: StopSignal::new(),
            }),
            delay,
            step: step.max(Duration::from_millis(1)),
            worker: Mutex::new(None),
        }
    }

    /// 회수 사이클 예약. 이미 진행 중이면 취소 플래그만 해제한다
    pub fn schedule(&self) {
        self.state.cancelled.store(false, Ordering::SeqCst);
        if self.state.running.swap(true, Ordering::SeqCst) {
            debug!("회수 사이클 진행 중, 추가 예약 생략");
            return;
        }

        let mut worker = self.worker.lock();
        if let Some(previous) = worker.take() {
            // 이전 사이클은 running=false 이후에만 여기 도달하므로 곧 끝난다
            if previous.join().is_err() {
                warn!("이전 회수 스레드 panic으로 종료됨");
            }
        }

        let state = self.state.clone();
        let (delay, step) = (self.delay, self.step);
        let spawned = std::thread::Builder::new()
            .name("ipc_reclaim".to_string())
            .spawn(move || run_cycle(&state, delay, step));

        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                self.state.running.store(false, Ordering::SeqCst);
                warn!("회수 스레드 생성 실패: {e}");
            }
        }
    }

    /// 진행 중인 사이클 취소 (다음 확인 시점에 종료)
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    /// 즉시 회수 요청
    pub fn trigger_now(&self) {
        info!("유휴 IPC 스레드 회수 요청");
        self.state.ipc.trigger_idle_thread_reclaim();
    }

    /// 사이클이 진행 중인지
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// 진행 중인 사이클을 깨워 종료시키고 스레드를 join
    pub fn shutdown(&self) {
        self.state.stop.stop();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("회수 스레드 join 실패");
            }
        }
        self.state.stop.reset();
    }
}

impl Drop for IdleThreadReclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 사이클이 어떻게 끝나든(panic 포함) running을 내린다
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn run_cycle(state: &ReclaimState, delay: Duration, step: Duration) {
    let _running = RunningGuard(&state.running);
    let mut waited = Duration::ZERO;
    while waited < delay {
        if state.cancelled.load(Ordering::SeqCst) {
            debug!("회수 사이클 취소됨");
            return;
        }
        if state.stop.wait_for(step) {
            debug!("회수 사이클 정지됨");
            return;
        }
        waited += step;
    }

    if state.cancelled.load(Ordering::SeqCst) {
        return;
    }
    info!("유휴 IPC 스레드 회수 요청 (화면 꺼짐 지속)");
    state.ipc.trigger_idle_thread_reclaim();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingIpc(AtomicUsize);

    impl IpcThreadControl for CountingIpc {
        fn trigger_idle_thread_reclaim(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reclaimer(ipc: &Arc<CountingIpc>) -> IdleThreadReclaimer {
        IdleThreadReclaimer::new(
            ipc.clone(),
            Duration::from_millis(60),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn fires_once_after_delay() {
        let ipc = Arc::new(CountingIpc::default());
        let reclaimer = reclaimer(&ipc);

        reclaimer.schedule();
        reclaimer.schedule();
        assert!(reclaimer.is_running());

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(ipc.0.load(Ordering::SeqCst), 1);
        assert!(!reclaimer.is_running());
    }

    #[test]
    fn cancel_stops_cycle() {
        let ipc = Arc::new(CountingIpc::default());
        let reclaimer = reclaimer(&ipc);

        reclaimer.schedule();
        reclaimer.cancel();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(ipc.0.load(Ordering::SeqCst), 0);
        assert!(!reclaimer.is_running());
    }

    #[test]
    fn shutdown_joins_without_firing() {
        let ipc = Arc::new(CountingIpc::default());
        let reclaimer = IdleThreadReclaimer::new(
            ipc.clone(),
            Duration::from_secs(130),
            Duration::from_secs(2),
        );

        reclaimer.schedule();
        reclaimer.shutdown();

        assert!(!reclaimer.is_running());
        assert_eq!(ipc.0.load(Ordering::SeqCst), 0);
    }

    /// 첫 회수 요청에서 panic
    #[derive(Default)]
    struct FlakyIpc(AtomicUsize);

    impl IpcThreadControl for FlakyIpc {
        fn trigger_idle_thread_reclaim(&self) {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("ipc unavailable");
            }
        }
    }

    #[test]
    fn panicked_cycle_does_not_block_next_schedule() {
        let ipc = Arc::new(FlakyIpc::default());
        let reclaimer = IdleThreadReclaimer::new(
            ipc.clone(),
            Duration::from_millis(20),
            Duration::from_millis(10),
        );

        reclaimer.schedule();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!reclaimer.is_running());

        // 이전 스레드의 panic은 join 시 경고로만 남는다
        reclaimer.schedule();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(ipc.0.load(Ordering::SeqCst), 2);
        assert!(!reclaimer.is_running());
    }

    #[test]
    fn trigger_now_is_immediate() {
        let ipc = Arc::new(CountingIpc::default());
        reclaimer(&ipc).trigger_now();
        assert_eq!(ipc.0.load(Ordering::SeqCst), 1);
    }
}
