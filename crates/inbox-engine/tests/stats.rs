//! Queue statistics

mod common;

use common::*;
use inbox_engine::prelude::*;

#[tokio::test]
async fn test_team_figures_without_resolutions() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;
    fx.agent("b", 1, true).await;
    fx.agent("c", 2, false).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a", "b", "c"]).await;

    let first = fx.queued_session(Some(&team.team_id), "c1", 10).await;
    fx.queued_session(Some(&team.team_id), "c2", 10).await;
    fx.queued_session(Some(&team.team_id), "c3", 10).await;
    assert!(fx.api.claim_session(&agent_actor("a"), &first.session_id).await.unwrap().is_claimed());

    let stats = fx
        .api
        .get_queue_stats(&agent_actor("a"), &[team.team_id.clone()], None)
        .await
        .unwrap();
    assert_eq!(stats.len(), 1);
    let stats = &stats[0];

    assert_eq!(stats.team_name, "Support");
    assert_eq!(stats.queue_size, 2);
    assert_eq!(stats.active_chats, 1);
    // c is offline
    assert_eq!(stats.agent_count, 2);
    assert_eq!(stats.lookback_hours, 24);

    let avg_wait = stats.avg_wait_time_minutes.expect("wait samples");
    assert!((9.9..11.0).contains(&avg_wait), "avg wait {}", avg_wait);
    assert!(stats.longest_wait_time_minutes.unwrap() >= avg_wait);

    assert_eq!(stats.avg_resolution_time_minutes, None);
    assert_eq!(stats.longest_resolution_time_minutes, None);
}

#[tokio::test]
async fn test_empty_team_reports_no_data() {
    let fx = fixture().await;
    let team = fx.team("Quiet", RoutingStrategy::RoundRobin, &[]).await;

    let stats = fx
        .api
        .get_queue_stats(&fx.supervisor, &[team.team_id.clone()], Some(1))
        .await
        .unwrap();
    let stats = &stats[0];
    assert_eq!(stats.queue_size, 0);
    assert_eq!(stats.agent_count, 0);
    assert_eq!(stats.avg_wait_time_minutes, None);
    assert_eq!(stats.avg_resolution_time_minutes, None);

    let json = serde_json::to_value(stats).unwrap();
    assert!(json["avg_wait_time_minutes"].is_null());
    assert!(json["avg_resolution_time_minutes"].is_null());
}

#[tokio::test]
async fn test_resolution_time_after_resolve() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;

    let outcome = fx
        .api
        .resolve_session(
            &agent_actor("a"),
            &session.session_id,
            ResolveRequest::new(WrapUpPayload::Default {
                category: Some(ResolutionCategory::GeneralInquiry),
                notes: None,
            }),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ResolveOutcome::Resolved { .. }));

    let stats = fx
        .api
        .get_queue_stats(&fx.supervisor, &[team.team_id.clone()], None)
        .await
        .unwrap();
    let stats = &stats[0];
    assert_eq!(stats.active_chats, 0);
    let avg = stats.avg_resolution_time_minutes.expect("resolution sample");
    assert!((0.0..1.0).contains(&avg));
}

#[tokio::test]
async fn test_every_team_when_none_requested() {
    let fx = fixture().await;
    fx.team("Sales", RoutingStrategy::RoundRobin, &[]).await;
    fx.team("Support", RoutingStrategy::RoundRobin, &[]).await;

    let stats = fx.api.get_queue_stats(&fx.supervisor, &[], None).await.unwrap();
    assert_eq!(stats.len(), 2);
}

#[tokio::test]
async fn test_stats_argument_errors() {
    let fx = fixture().await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &[]).await;

    let err = fx
        .api
        .get_queue_stats(&fx.supervisor, &[team.team_id.clone()], Some(0))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .get_queue_stats(&fx.supervisor, &[team.team_id.clone()], Some(u32::MAX))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .get_queue_stats(&fx.supervisor, &["missing".to_string()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotFound(_)));
}
