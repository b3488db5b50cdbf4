//! 온디맨드 도메인 모델.
//!
//! 프로파일, 이벤트, 제어 결정, 부가 데이터 레코드를 정의한다.
//! 모든 모델은 `serde` Serialize/Deserialize를 구현한다.

pub mod common_event;
pub mod control;
pub mod event;
pub mod extra_data;
pub mod profile;
