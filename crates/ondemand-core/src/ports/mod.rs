//! 포트 인터페이스 (trait).
//!
//! Hexagonal Architecture의 포트 레이어.
//! 수집 플러그인과 외부 협력자(스케줄러, 브로드캐스트, IPC, 부하 샘플러)를
//! `Arc<dyn T>`로 주입받는다. 모든 포트는 동기 trait이다.

pub mod collect;
pub mod common_event;
pub mod ipc;
pub mod monitor;
pub mod reporter;
pub mod scheduler;
