//! # ondemand-collect
//!
//! 디바이스 상태 수집 어댑터.
//! 브로드캐스트·파라미터·설정 스위치·원격 디바이스·타이머 신호를 수집하여
//! 온디맨드 프로파일과 상관시키고, 시스템 서비스 시작/중지 결정을 스케줄러에 넘긴다.
//! 작업 큐, TTL 부가 데이터 저장소, 유휴 IPC 스레드 회수, CPU 유휴 감지를 포함한다.

pub mod common_event;
pub mod cpu_monitor;
pub mod extra_data;
pub mod manager;
pub mod networking;
pub mod plugin_set;
pub mod reclaim;
pub mod state_collect;
pub mod task_queue;
pub mod timed;

mod signal;
