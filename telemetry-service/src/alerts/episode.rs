use std::collections::BTreeMap;

use crate::config::RetryPolicy;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelAttempts {
    /// Dispatches handed out in this episode, counted when handed out.
    attempts: u32,
    in_flight: bool,
    delivered: bool,
}

/// Alert suppression for one contiguous theft episode.
///
/// `clear -> alerted` when theft is first seen (every channel is dispatched),
/// `alerted -> alerted` while it persists (nothing, unless the retry policy
/// allows a failed channel another attempt), `alerted -> clear` as soon as
/// theft is no longer reported.
///
/// Each episode gets a new id. Outcomes are recorded against the id they were
/// dispatched under, so a late outcome from a finished episode is dropped.
#[derive(Debug, Clone)]
pub struct AlertEpisode {
    policy: RetryPolicy,
    alerted: bool,
    id: u64,
    channels: BTreeMap<String, ChannelAttempts>,
}

impl AlertEpisode {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            alerted: false,
            id: 0,
            channels: BTreeMap::new(),
        }
    }

    pub fn is_alerted(&self) -> bool {
        self.alerted
    }

    /// Id of the current (or most recent) episode.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Feed the latest theft flag; returns the channels to dispatch now.
    ///
    /// A channel that is handed out is marked in flight until its outcome is
    /// recorded and is never handed out again meanwhile.
    pub fn evaluate(&mut self, theft_detected: bool, channels: &[String]) -> Vec<String> {
        if !theft_detected {
            if self.alerted {
                tracing::info!(episode = self.id, "theft cleared, alert suppression reset");
            }
            self.alerted = false;
            self.channels.clear();
            return Vec::new();
        }

        if !self.alerted {
            self.alerted = true;
            self.id += 1;
            self.channels = channels
                .iter()
                .map(|name| {
                    let attempts = ChannelAttempts {
                        attempts: 1,
                        in_flight: true,
                        delivered: false,
                    };
                    (name.clone(), attempts)
                })
                .collect();
            return channels.to_vec();
        }

        let RetryPolicy::WhileActive { max_attempts } = self.policy else {
            return Vec::new();
        };
        self.channels
            .iter_mut()
            .filter(|(_, c)| !c.delivered && !c.in_flight && c.attempts < max_attempts)
            .map(|(name, c)| {
                c.attempts += 1;
                c.in_flight = true;
                name.clone()
            })
            .collect()
    }

    /// Record the outcome of a dispatch made under episode `id`. A failure
    /// never clears the alerted state.
    pub fn record(&mut self, id: u64, channel: &str, delivered: bool) {
        if !self.alerted || id != self.id {
            tracing::debug!(episode = id, channel, "dropping alert outcome from a finished episode");
            return;
        }
        if let Some(c) = self.channels.get_mut(channel) {
            c.in_flight = false;
            c.delivered |= delivered;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<String> {
        vec!["sms".to_string(), "ops".to_string()]
    }

    fn sms() -> Vec<String> {
        vec!["sms".to_string()]
    }

    #[test]
    fn one_dispatch_per_episode() {
        let mut episode = AlertEpisode::new(RetryPolicy::Never);
        let dispatches: Vec<usize> = [false, true, true, false, true]
            .iter()
            .enumerate()
            .filter(|(_, &theft)| !episode.evaluate(theft, &channels()).is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(dispatches, vec![1, 4]);
        assert_eq!(episode.id(), 2);
    }

    #[test]
    fn failed_send_still_counts_as_sent_by_default() {
        let mut episode = AlertEpisode::new(RetryPolicy::Never);
        assert_eq!(episode.evaluate(true, &channels()), channels());
        let id = episode.id();
        episode.record(id, "sms", false);
        episode.record(id, "ops", true);
        assert!(episode.is_alerted());
        assert!(episode.evaluate(true, &channels()).is_empty());
    }

    #[test]
    fn while_active_retries_failed_channel_up_to_cap() {
        let mut episode = AlertEpisode::new(RetryPolicy::WhileActive { max_attempts: 2 });
        episode.evaluate(true, &channels());
        let id = episode.id();
        episode.record(id, "sms", false);
        episode.record(id, "ops", true);

        assert_eq!(episode.evaluate(true, &channels()), sms());
        episode.record(id, "sms", false);
        assert!(episode.evaluate(true, &channels()).is_empty());
    }

    #[test]
    fn in_flight_channel_is_not_handed_out_again() {
        let mut episode = AlertEpisode::new(RetryPolicy::WhileActive { max_attempts: 2 });
        episode.evaluate(true, &sms());
        let id = episode.id();

        // Overlapping polls while the first send is still outstanding.
        assert!(episode.evaluate(true, &sms()).is_empty());
        assert!(episode.evaluate(true, &sms()).is_empty());

        episode.record(id, "sms", false);
        assert_eq!(episode.evaluate(true, &sms()), sms());
        assert!(episode.evaluate(true, &sms()).is_empty());

        episode.record(id, "sms", false);
        assert!(episode.evaluate(true, &sms()).is_empty());
    }

    #[test]
    fn retry_stops_once_delivered() {
        let mut episode = AlertEpisode::new(RetryPolicy::WhileActive { max_attempts: 5 });
        episode.evaluate(true, &channels());
        let id = episode.id();
        episode.record(id, "sms", true);
        episode.record(id, "ops", false);
        assert_eq!(episode.evaluate(true, &channels()), vec!["ops".to_string()]);
        episode.record(id, "ops", true);
        assert!(episode.evaluate(true, &channels()).is_empty());
    }

    #[test]
    fn clearing_resets_attempts_and_outcomes_after_clear_are_ignored() {
        let mut episode = AlertEpisode::new(RetryPolicy::WhileActive { max_attempts: 5 });
        episode.evaluate(true, &channels());
        let first = episode.id();
        episode.evaluate(false, &channels());
        episode.record(first, "sms", false);
        assert!(!episode.is_alerted());
        assert_eq!(episode.evaluate(true, &channels()), channels());
    }

    #[test]
    fn late_outcome_from_previous_episode_does_not_touch_current_one() {
        let mut episode = AlertEpisode::new(RetryPolicy::WhileActive { max_attempts: 5 });
        episode.evaluate(true, &sms());
        let first = episode.id();
        episode.evaluate(false, &sms());
        episode.evaluate(true, &sms());
        assert_ne!(episode.id(), first);

        // The first episode's failure arrives while the second send is in flight.
        episode.record(first, "sms", false);
        assert!(episode.evaluate(true, &sms()).is_empty());
    }
}
