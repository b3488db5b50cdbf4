//! IPC 스레드 풀 제어 포트.

/// 유휴 IPC 워커 스레드 회수 힌트 (반환값에 의존하지 않는다)
pub trait IpcThreadControl: Send + Sync {
    fn trigger_idle_thread_reclaim(&self);
}
