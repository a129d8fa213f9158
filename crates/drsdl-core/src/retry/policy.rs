use std::time::Duration;

/// Decision returned by the retry policy for one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Bounded-attempt exponential backoff with jitter, matching the part-fetch
/// retry formula (§4.3): up to `max_attempts` tries; delay before attempt
/// `attempt + 1` is `2^attempt + random(0,1)` seconds.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// `attempt` is 1-based (1 = first attempt, already made).
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        let exp = 2f64.powi(attempt as i32);
        let jitter: f64 = rand::random();
        RetryDecision::RetryAfter(Duration::from_secs_f64(exp + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_attempts() {
        let p = RetryPolicy::new(3);
        assert!(matches!(p.decide(1), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3), RetryDecision::NoRetry);
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let p = RetryPolicy::new(10);
        let RetryDecision::RetryAfter(d1) = p.decide(1) else {
            panic!("expected retry")
        };
        let RetryDecision::RetryAfter(d4) = p.decide(4) else {
            panic!("expected retry")
        };
        // 2^1 + [0,1) is always less than 2^4 + [0,1).
        assert!(d1 < d4);
    }

    #[test]
    fn default_is_three_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts, 3);
    }
}
