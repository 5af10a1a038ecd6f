use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Elapsed milliseconds since the client-reported form start. `None` when the
/// field is absent or doesn't parse; the caller decides what to do with the
/// number (the orchestrator rejects anything under its fill-time floor).
pub fn compute_elapsed_ms_from_t0(t0: Option<&str>, now_ms: i64) -> Option<i64> {
    let t0 = t0?;
    let start: i64 = match t0.parse() {
        Ok(start) => start,
        // Digit strings too long for i64 saturate rather than bypass the guard
        Err(_) if !t0.is_empty() && t0.bytes().all(|b| b.is_ascii_digit()) => i64::MAX,
        Err(_) => return None,
    };
    Some(now_ms.saturating_sub(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_from_a_past_t0_is_non_negative() {
        let now = now_ms();
        let t0 = (now - 1000).to_string();
        let elapsed = compute_elapsed_ms_from_t0(Some(&t0), now_ms());
        assert!(elapsed.is_some_and(|ms| ms >= 0));
    }

    #[test]
    fn absent_t0_yields_none() {
        assert_eq!(compute_elapsed_ms_from_t0(None, 1000), None);
    }

    #[test]
    fn unparseable_t0_yields_none() {
        assert_eq!(compute_elapsed_ms_from_t0(Some("abc"), 1000), None);
        assert_eq!(compute_elapsed_ms_from_t0(Some(""), 1000), None);
    }

    #[test]
    fn elapsed_is_now_minus_start() {
        assert_eq!(compute_elapsed_ms_from_t0(Some("800"), 2000), Some(1200));
    }

    #[test]
    fn overlong_digit_t0_saturates_instead_of_disabling_the_guard() {
        let elapsed = compute_elapsed_ms_from_t0(Some("99999999999999999999"), 1000);
        assert!(elapsed.is_some_and(|ms| ms < 0));
    }
}
