//! CPU 유휴 감지.
//!
//! 주기적으로 CPU 사용률과 평균 부하를 샘플링해 시스템이 한가하면
//! 유휴 IPC 스레드 회수를 요청한다. 샘플링 스레드는 실제 시간으로 잠들며
//! 요청 처리 경로와 무관하다.

use ondemand_core::config::CpuMonitorConfig;
use ondemand_core::ports::monitor::{CpuLoadSample, LoadSampler};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

use crate::signal::StopSignal;

/// 유휴 판정
///
/// 1분 부하 < 코어 수 + 1, 1분 부하 < 5분 부하(하강 추세), 0 < 사용률 <= 임계값
pub fn is_cpu_idle(sample: &CpuLoadSample, idle_threshold_percent: f32) -> bool {
    sample.load_one < sample.logical_cores as f64 + 1.0
        && sample.load_one < sample.load_five
        && sample.usage_percent > 0.0
        && sample.usage_percent <= idle_threshold_percent
}

/// sysinfo 기반 부하 샘플러: `LoadSampler` 포트 구현
pub struct SysInfoLoadSampler {
    sys: Mutex<System>,
}

impl SysInfoLoadSampler {
    /// 새 샘플러 생성
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new_with_specifics(
                RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
            )),
        }
    }
}

impl Default for SysInfoLoadSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSampler for SysInfoLoadSampler {
    fn sample(&self, window: Duration) -> Option<CpuLoadSample> {
        // 구간 측정: 첫 갱신은 기준점, 두 번째 갱신이 구간 사용률
        self.sys.lock().refresh_cpu_usage();
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));

        let mut sys = self.sys.lock();
        sys.refresh_cpu_usage();
        let logical_cores = sys.cpus().len();
        if logical_cores == 0 {
            warn!("CPU 정보 없음, 샘플 생략");
            return None;
        }
        let usage_percent = sys.global_cpu_usage();
        let load = System::load_average();

        Some(CpuLoadSample {
            usage_percent,
            load_one: load.one,
            load_five: load.five,
            logical_cores,
        })
    }
}

/// 유휴 감지 시 호출되는 콜백
pub type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// CPU 유휴 감지 스레드 소유자
pub struct CpuLoadMonitor {
    sampler: Arc<dyn LoadSampler>,
    on_idle: IdleCallback,
    interval: Duration,
    window: Duration,
    idle_threshold_percent: f32,
    stop: Arc<StopSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpuLoadMonitor {
    pub fn new(sampler: Arc<dyn LoadSampler>, config: &CpuMonitorConfig, on_idle: IdleCallback) -> Self {
        Self {
            sampler,
            on_idle,
            interval: Duration::from_secs(config.check_interval_secs),
            window: Duration::from_secs(config.sample_window_secs),
            idle_threshold_percent: config.idle_threshold_percent,
            stop: Arc::new(StopSignal::new()),
            worker: Mutex::new(None),
        }
    }

    /// 주기·측정 구간 직접 지정 (테스트 및 세밀한 조정용)
    pub fn with_timing(mut self, interval: Duration, window: Duration) -> Self {
        self.interval = interval;
        self.window = window;
        self
    }

    /// 감지 스레드 시작 (이미 실행 중이면 무시)
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.stop.reset();

        let sampler = self.sampler.clone();
        let on_idle = self.on_idle.clone();
        let stop = self.stop.clone();
        let wait = self.interval.saturating_sub(self.window);
        let window = self.window;
        let threshold = self.idle_threshold_percent;

        let spawned = std::thread::Builder::new()
            .name("OS_CPU_MONITOR".to_string())
            .spawn(move || {
                info!("CPU 유휴 감지 시작");
                while !stop.wait_for(wait) {
                    let Some(sample) = sampler.sample(window) else {
                        continue;
                    };
                    if stop.is_stopped() {
                        break;
                    }
                    debug!(
                        "CPU 사용률 {:.1}%, 1분 {:.2}, 5분 {:.2}",
                        sample.usage_percent, sample.load_one, sample.load_five
                    );
                    if is_cpu_idle(&sample, threshold) {
                        info!("CPU 유휴 감지, 유휴 IPC 스레드 회수 요청");
                        on_idle();
                    }
                }
                info!("CPU 유휴 감지 종료");
            });

        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => warn!("CPU 감지 스레드 생성 실패: {e}"),
        }
    }

    /// 감지 스레드 정지 및 join (멱등)
    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.stop.stop();
            if handle.join().is_err() {
                warn!("CPU 감지 스레드 join 실패");
            }
        }
    }

    /// 감지 스레드가 실행 중인지
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for CpuLoadMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
