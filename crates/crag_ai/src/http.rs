use std::time::Duration;

use crag_core::error::{AppError, ErrorKind};

/// Map a failed `ureq` call to a provider error. Throttling, server errors and
/// transport failures (including timeouts) are marked retryable.
pub(crate) fn provider_error(code: &str, what: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp
                .into_string()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            AppError::new(ErrorKind::Provider, code, format!("{what} request failed"))
                .with_details(format!("status={status}; body={}", truncate(&body, 400)))
                .with_retryable(status == 429 || status >= 500)
        }
        ureq::Error::Transport(t) => {
            AppError::new(ErrorKind::Provider, code, format!("Failed to call {what} endpoint"))
                .with_details(t.to_string())
                .with_retryable(true)
        }
    }
}

pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
