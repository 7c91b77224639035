//! # Queue Stats Aggregator
//!
//! Read-only projections recomputed on every request; nothing is persisted.
//!
//! - wait time: `assigned_at - created_at` for sessions assigned inside the
//!   lookback window, and `now - created_at` for sessions still waiting
//! - resolution time: `resolved_at - assigned_at` for sessions resolved inside
//!   the window
//!
//! Averages are taken over the available samples only. No samples means
//! `None` ("no data"), never `0` and never NaN.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::PresenceManager;
use crate::config::StatsConfig;
use crate::database::DatabaseManager;
use crate::error::{InboxError, Result};
use crate::team::TeamRegistry;

/// Live queue figures of one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamQueueStats {
    pub team_id: String,
    pub team_name: String,
    pub queue_size: u64,
    pub active_chats: u64,
    pub agent_count: u64,
    pub avg_wait_time_minutes: Option<f64>,
    pub longest_wait_time_minutes: Option<f64>,
    pub avg_resolution_time_minutes: Option<f64>,
    pub longest_resolution_time_minutes: Option<f64>,
    pub lookback_hours: u32,
    pub computed_at: DateTime<Utc>,
}

/// Average and maximum of a set of durations, in minutes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DurationSummary {
    pub average_minutes: Option<f64>,
    pub longest_minutes: Option<f64>,
}

impl DurationSummary {
    pub fn from_durations<I>(durations: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        let mut count = 0u64;
        let mut total = 0.0;
        let mut longest: Option<f64> = None;

        for duration in durations {
            // Clock skew between writers must not produce negative waits
            let minutes = duration.num_milliseconds().max(0) as f64 / 60_000.0;
            count += 1;
            total += minutes;
            longest = Some(longest.map_or(minutes, |l| l.max(minutes)));
        }

        Self {
            average_minutes: (count > 0).then(|| total / count as f64),
            longest_minutes: longest,
        }
    }
}

pub struct QueueStatsAggregator {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    presence: Arc<PresenceManager>,
    config: StatsConfig,
}

impl QueueStatsAggregator {
    pub fn new(
        db: DatabaseManager,
        registry: Arc<TeamRegistry>,
        presence: Arc<PresenceManager>,
        config: StatsConfig,
    ) -> Self {
        Self {
            db,
            registry,
            presence,
            config,
        }
    }

    /// Stats for the given teams (every team of the tenant when empty)
    pub async fn get_queue_stats(
        &self,
        tenant_id: &str,
        team_ids: &[String],
        lookback_hours: Option<u32>,
    ) -> Result<Vec<TeamQueueStats>> {
        let lookback_hours = lookback_hours.unwrap_or(self.config.lookback_hours);
        if lookback_hours == 0 {
            return Err(InboxError::validation("lookback_hours must be greater than 0"));
        }

        let team_ids: Vec<String> = if team_ids.is_empty() {
            self.registry
                .list_teams(tenant_id)
                .await?
                .into_iter()
                .map(|t| t.team_id)
                .collect()
        } else {
            team_ids.to_vec()
        };

        let now = Utc::now();
        let mut stats = Vec::with_capacity(team_ids.len());
        for team_id in &team_ids {
            stats.push(self.team_stats(tenant_id, team_id, lookback_hours, now).await?);
        }
        Ok(stats)
    }

    pub async fn team_stats(
        &self,
        tenant_id: &str,
        team_id: &str,
        lookback_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<TeamQueueStats> {
        let snapshot = self.registry.snapshot(tenant_id, team_id).await?;
        let since = now
            .checked_sub_signed(Duration::hours(i64::from(lookback_hours)))
            .ok_or_else(|| InboxError::validation("lookback_hours is out of range"))?;

        let (queue_size, active_chats) = self.db.team_session_counts(tenant_id, team_id).await?;
        let agent_count = self
            .presence
            .eligible_agents(tenant_id, team_id, &snapshot.member_ids(), now)
            .await?
            .len() as u64;

        let waits = self.db.team_wait_samples(tenant_id, team_id, since).await?;
        let wait = DurationSummary::from_durations(
            waits
                .into_iter()
                .map(|(created, assigned)| assigned.unwrap_or(now) - created),
        );

        let resolutions = self.db.team_resolution_samples(tenant_id, team_id, since).await?;
        let resolution = DurationSummary::from_durations(
            resolutions
                .into_iter()
                .map(|(assigned, resolved)| resolved - assigned),
        );

        debug!(
            "📊 Team {}: {} queued, {} active, {} eligible agents",
            team_id, queue_size, active_chats, agent_count
        );

        Ok(TeamQueueStats {
            team_id: team_id.to_string(),
            team_name: snapshot.team.name.clone(),
            queue_size,
            active_chats,
            agent_count,
            avg_wait_time_minutes: wait.average_minutes,
            longest_wait_time_minutes: wait.longest_minutes,
            avg_resolution_time_minutes: resolution.average_minutes,
            longest_resolution_time_minutes: resolution.longest_minutes,
            lookback_hours,
            computed_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_samples_is_none_not_zero() {
        let summary = DurationSummary::from_durations(Vec::new());
        assert_eq!(summary.average_minutes, None);
        assert_eq!(summary.longest_minutes, None);
    }

    #[test]
    fn test_average_and_longest() {
        let summary = DurationSummary::from_durations(vec![
            Duration::minutes(2),
            Duration::minutes(4),
            Duration::seconds(90),
        ]);
        let avg = summary.average_minutes.unwrap();
        assert!((avg - 2.5).abs() < 1e-9);
        assert_eq!(summary.longest_minutes, Some(4.0));
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let summary = DurationSummary::from_durations(vec![Duration::seconds(-30)]);
        assert_eq!(summary.average_minutes, Some(0.0));
    }
}
