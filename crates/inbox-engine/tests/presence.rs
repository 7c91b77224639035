//! Presence store and eligibility

mod common;

use chrono::{Duration, Utc};
use common::*;
use inbox_engine::prelude::*;

#[tokio::test]
async fn test_new_agents_start_offline_with_default_capacity() {
    let fx = fixture().await;
    let profile = fx
        .api
        .upsert_agent(&fx.supervisor, "a", "Alice", None)
        .await
        .unwrap();

    assert_eq!(profile.status, AgentStatus::Offline);
    assert_eq!(profile.presence_reason, PresenceReason::Unavailable);
    assert_eq!(profile.max_concurrent_chats, 3);
    assert!(profile.active);

    let err = fx.api.upsert_agent(&fx.supervisor, "b", "Bob", Some(0)).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_reason_must_fit_status() {
    let fx = fixture().await;
    fx.agent("a", 2, false).await;
    let me = agent_actor("a");

    let err = fx
        .api
        .set_presence(&me, AgentStatus::Offline, Some(PresenceReason::Busy))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let busy = fx
        .api
        .set_presence(&me, AgentStatus::Online, Some(PresenceReason::Busy))
        .await
        .unwrap();
    assert_eq!(busy.status, AgentStatus::Online);
    assert_eq!(busy.presence_reason, PresenceReason::Busy);

    let leave = fx
        .api
        .set_presence(&me, AgentStatus::Offline, Some(PresenceReason::OnLeave))
        .await
        .unwrap();
    assert_eq!(leave.presence_reason, PresenceReason::OnLeave);
}

#[tokio::test]
async fn test_unknown_agent_cannot_set_presence() {
    let fx = fixture().await;
    let err = fx
        .api
        .set_presence(&agent_actor("ghost"), AgentStatus::Online, None)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotFound(_)));
}

#[tokio::test]
async fn test_going_offline_keeps_existing_sessions() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;

    let profile = fx.api.force_offline(TENANT, "a").await.unwrap();
    assert_eq!(profile.status, AgentStatus::Offline);

    let session = fx.session(&session.session_id).await;
    assert_eq!(session.status, SessionStatus::Assigned);
    assert_eq!(session.assigned_agent_id.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_deactivated_agents_are_never_eligible() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a"]).await;

    fx.api.deactivate_agent(&fx.supervisor, "a").await.unwrap();
    fx.queued_session(Some(&team.team_id), "c1", 5).await;
    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 0);

    let err = fx
        .api
        .set_presence(&agent_actor("a"), AgentStatus::Online, None)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Conflict(_)));

    // Re-granting the capability reactivates the profile
    let profile = fx.api.upsert_agent(&fx.supervisor, "a", "a", Some(2)).await.unwrap();
    assert!(profile.active);
}

#[tokio::test]
async fn test_agents_are_scoped_to_their_tenant() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;

    let other = Actor::supervisor("tenant-2", "sup-2");
    let err = fx.api.get_agent(&other, "a").await.unwrap_err();
    assert!(matches!(err, InboxError::NotFound(_)));

    let err = fx.api.upsert_agent(&other, "a", "Imposter", None).await.unwrap_err();
    assert!(matches!(err, InboxError::Conflict(_)));
}

#[tokio::test]
async fn test_shift_bounds_are_validated() {
    let fx = fixture().await;
    let now = Utc::now();
    let err = fx
        .api
        .add_shift(&fx.supervisor, None, "a", now, now - Duration::hours(1))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    fx.api
        .add_shift(&fx.supervisor, None, "a", now, now + Duration::hours(8))
        .await
        .unwrap();
    assert_eq!(fx.api.list_shifts(&fx.supervisor, "a").await.unwrap().len(), 1);
}
