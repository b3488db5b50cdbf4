//! 조건 관계식 평가.
//!
//! 프로파일의 부가 필드 조건은 `">=3"`, `"<10"`, `"!=wifi"`, `"on"` 같은
//! 관계식 문자열로 선언된다. 여기서 현재 상태 문자열과 비교한다.

/// 현재 상태값이 관계식을 만족하는지
///
/// - `>=`, `<=`, `>`, `<` : 양쪽을 정수로 비교. 어느 한쪽이라도 정수가 아니면 false
/// - `!=` : 문자열 불일치
/// - `=` 또는 접두사 없음 : 문자열 일치
pub fn check_logic_relationship(state: &str, expected: &str) -> bool {
    const NUMERIC_OPS: [&str; 4] = [">=", "<=", ">", "<"];

    for op in NUMERIC_OPS {
        if let Some(rhs) = expected.strip_prefix(op) {
            let (Ok(lhs), Ok(rhs)) = (state.trim().parse::<i64>(), rhs.trim().parse::<i64>()) else {
                return false;
            };
            return match op {
                ">=" => lhs >= rhs,
                "<=" => lhs <= rhs,
                ">" => lhs > rhs,
                _ => lhs < rhs,
            };
        }
    }

    if let Some(rhs) = expected.strip_prefix("!=") {
        return state != rhs;
    }
    let rhs = expected.strip_prefix('=').unwrap_or(expected);
    state == rhs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_relations() {
        assert!(check_logic_relationship("5", ">=5"));
        assert!(check_logic_relationship("6", ">5"));
        assert!(!check_logic_relationship("5", ">5"));
        assert!(check_logic_relationship("4", "<5"));
        assert!(check_logic_relationship("5", "<=5"));
        assert!(!check_logic_relationship("-1", ">=0"));
    }

    #[test]
    fn non_numeric_operand_fails_numeric_relation() {
        assert!(!check_logic_relationship("", ">=1"));
        assert!(!check_logic_relationship("wifi", "<3"));
        assert!(!check_logic_relationship("3", ">abc"));
    }

    #[test]
    fn string_relations() {
        assert!(check_logic_relationship("wifi", "wifi"));
        assert!(check_logic_relationship("wifi", "=wifi"));
        assert!(!check_logic_relationship("cell", "wifi"));
        assert!(check_logic_relationship("cell", "!=wifi"));
        assert!(!check_logic_relationship("wifi", "!=wifi"));
        assert!(check_logic_relationship("", ""));
    }
}
