//! 부가 데이터(활성화 근거) 레코드 모델.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 브로드캐스트 발신자 UID 키
pub const UID_KEY: &str = "uid";
/// 네트워크 종류 키
pub const NET_TYPE_KEY: &str = "NetType";
/// 발신 번들 이름 키
pub const BUNDLE_NAME_KEY: &str = "bundleName";
/// 원본 이벤트 이름(액션) 키
pub const EVENT_NAME_KEY: &str = "common_event_action_name";
/// 누락 필드 기본값
pub const MISSING_FIELD_VALUE: &str = "-1";

/// 이벤트 페이로드 스냅샷
///
/// 트리거 이벤트 자체는 보관되지 않으므로, 서비스가 나중에
/// "왜 시작되었는가"를 조회할 수 있도록 이 레코드만 ID로 남는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandReasonExtraData {
    /// 브로드캐스트 코드
    pub code: i32,
    /// 브로드캐스트 데이터 문자열
    pub data: String,
    /// 평탄화된 페이로드 필드
    pub want: BTreeMap<String, String>,
    /// 저장 시각
    pub created_at: DateTime<Utc>,
}

impl OnDemandReasonExtraData {
    /// 새 레코드 생성 (저장 시각 = 현재)
    pub fn new(code: i32, data: impl Into<String>, want: BTreeMap<String, String>) -> Self {
        Self {
            code,
            data: data.into(),
            want,
            created_at: Utc::now(),
        }
    }

    /// 원본 이벤트 이름 (없으면 빈 문자열)
    pub fn event_name(&self) -> &str {
        self.want.get(EVENT_NAME_KEY).map(String::as_str).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_reads_action_key() {
        let mut want = BTreeMap::new();
        want.insert(EVENT_NAME_KEY.to_string(), "usual.event.SCREEN_ON".to_string());
        let record = OnDemandReasonExtraData::new(1, "", want);
        assert_eq!(record.event_name(), "usual.event.SCREEN_ON");

        let empty = OnDemandReasonExtraData::new(0, "d", BTreeMap::new());
        assert_eq!(empty.event_name(), "");
    }
}
