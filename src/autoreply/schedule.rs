//! Schedule Evaluator
//!
//! Resolves whether the autoresponder is active from the manual switch and
//! the optional activation window.

use super::config::AutoresponderConfig;
use chrono::{DateTime, Utc};

/// Check whether the autoresponder is active at `now`.
///
/// A disabled autoresponder is never active, whatever the window says.
/// Without a window an enabled autoresponder is always active.
pub fn is_active(now: DateTime<Utc>, config: &AutoresponderConfig) -> bool {
    if !config.enabled {
        return false;
    }
    match &config.activation_window {
        None => true,
        Some(window) => window.contains(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::config::ActivationWindow;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_disabled_overrides_window() {
        let config = AutoresponderConfig::new()
            .with_window(ActivationWindow::new(Some(ts(0)), Some(ts(1_000))));
        assert!(!is_active(ts(500), &config));
    }

    #[test]
    fn test_enabled_without_window_is_active() {
        let config = AutoresponderConfig::new().enabled();
        assert!(is_active(ts(0), &config));
        assert!(is_active(ts(4_000_000_000), &config));
    }

    #[test]
    fn test_window_boundaries_active() {
        let config = AutoresponderConfig::new()
            .enabled()
            .with_window(ActivationWindow::new(Some(ts(100)), Some(ts(200))));

        assert!(!is_active(ts(99), &config));
        assert!(is_active(ts(100), &config));
        assert!(is_active(ts(150), &config));
        assert!(is_active(ts(200), &config));
        assert!(!is_active(ts(201), &config));
    }

    #[test]
    fn test_every_timestamp_outside_window_inactive() {
        let config = AutoresponderConfig::new()
            .enabled()
            .with_window(ActivationWindow::new(Some(ts(1_000)), Some(ts(2_000))));

        for t in (0..3_000).step_by(7) {
            let expected = (1_000..=2_000).contains(&t);
            assert_eq!(is_active(ts(t), &config), expected, "t = {}", t);
        }
    }

    #[test]
    fn test_empty_window_behaves_like_no_window() {
        let config = AutoresponderConfig::new()
            .enabled()
            .with_window(ActivationWindow::default());
        assert!(is_active(ts(42), &config));
    }
}
