//! A single generic timeout wrapper used by every blocking wait point in
//! the harness (spec.md §9: "provide one generic utility `run_with_timeout`
//! ... propagates either the value or a timeout fault tagged with `tag`").

use crate::error::HarnessError;
use std::future::Future;
use std::time::Duration;

/// Run `fut` to completion, or fail with `HarnessError::Timeout` tagged
/// `tag` if it does not finish within `seconds`.
pub async fn run_with_timeout<F, T>(fut: F, seconds: u64, tag: &str) -> Result<T, HarnessError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
        Ok(value) => Ok(value),
        Err(_) => Err(HarnessError::Timeout {
            tag: tag.to_string(),
            seconds,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_when_future_completes_in_time() {
        let result = run_with_timeout(async { 42 }, 5, "quick").await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_and_tags_the_error() {
        let result = run_with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            },
            0,
            "never_finishes",
        )
        .await;
        match result {
            Err(HarnessError::Timeout { tag, seconds }) => {
                assert_eq!(tag, "never_finishes");
                assert_eq!(seconds, 0);
            }
            _ => panic!("expected timeout error"),
        }
    }
}
