//! Exponential backoff shared by the realtime transport and the sync
//! engine's retry paths.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::{RealtimeClient, RealtimeConnection};

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first retry.
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Wait before retry number `attempt` (1-based), capped at `max_delay`.
///
/// `initial * multiplier^(attempt - 1)`; attempt 0 is treated as 1.
pub fn delay_for_attempt(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63) as i32;
    let scaled = config.initial_delay.as_secs_f64() * config.multiplier.powi(exponent);
    if !scaled.is_finite() || scaled >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(scaled.max(0.0))
}

/// Connect again, backing off between failures, until a connection is made
/// or `cancel` fires (`None`).
pub async fn reconnect_loop(
    client: &RealtimeClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<RealtimeConnection> {
    for attempt in 1u32.. {
        if cancel.is_cancelled() {
            return None;
        }
        let connected = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = client.connect() => result,
        };
        let error = match connected {
            Ok(conn) => {
                tracing::info!(url = client.ws_url(), attempt, "Realtime socket reconnected");
                return Some(conn);
            }
            Err(e) => e,
        };

        let delay = delay_for_attempt(attempt, config);
        tracing::warn!(
            url = client.ws_url(),
            attempt,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "Realtime reconnect failed",
        );
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_cap() {
        let config = ReconnectConfig::default();
        let secs: Vec<u64> = (1..=8)
            .map(|attempt| delay_for_attempt(attempt, &config).as_secs())
            .collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        let config = ReconnectConfig::default();
        assert_eq!(delay_for_attempt(u32::MAX, &config), config.max_delay);
        assert_eq!(delay_for_attempt(0, &config), config.initial_delay);
    }

    #[test]
    fn sub_second_initial_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(delay_for_attempt(3, &config), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn cancelled_token_skips_connecting() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = RealtimeClient::new("ws://127.0.0.1:9");
        assert!(reconnect_loop(&client, &ReconnectConfig::default(), &cancel)
            .await
            .is_none());
    }
}
