//! 온디맨드 엔진 핵심 에러 타입.
//!
//! 수집 플러그인, 상관기, 작업 큐 모두 `CoreError`를 반환한다.
//! 부가 데이터 미발견처럼 정상적인 "없음" 결과는 에러가 아니라 `Option`/빈 목록으로 표현한다.

use thiserror::Error;

use crate::models::event::EventCategory;

/// 코어 레이어 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 등록된 수집 플러그인이 없는 이벤트 카테고리 (설정 오류)
    #[error("지원하지 않는 이벤트 카테고리: {0}")]
    UnsupportedCategory(EventCategory),

    /// 온디맨드 프로파일 미발견
    #[error("온디맨드 프로파일 미발견: saId={0}")]
    ProfileNotFound(i32),

    /// 경계에서 거부된 프로파일 (잘못된 saId, 빈 프로세스 이름 등)
    #[error("잘못된 프로파일: saId={sa_id}: {reason}")]
    InvalidProfile {
        /// 거부된 프로파일의 saId
        sa_id: i32,
        /// 거부 사유
        reason: String,
    },

    /// 필드 유효성 검증 실패
    #[error("유효성 검증 실패: {field}: {message}")]
    Validation {
        /// 검증 실패한 필드명
        field: String,
        /// 실패 사유
        message: String,
    },

    /// 브로드캐스트 구독 생성/해제 실패 (일시적 인프라 오류)
    #[error("구독 에러: {0}")]
    Subscription(String),

    /// 작업 큐 미초기화 또는 종료됨
    #[error("작업 큐 사용 불가: {0}")]
    QueueUnavailable(String),

    /// 같은 카테고리에 플러그인 중복 등록
    #[error("이미 등록된 수집 플러그인: {0}")]
    PluginAlreadyRegistered(EventCategory),

    /// 상관기 중복 초기화
    #[error("이미 초기화됨")]
    AlreadyInitialized,

    /// 설정값 오류
    #[error("설정 에러: {0}")]
    Config(String),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O 에러
    #[error("I/O 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 내부 에러 (예상치 못한 상황)
    #[error("내부 에러: {0}")]
    Internal(String),
}
