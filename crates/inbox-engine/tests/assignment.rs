//! Assignment engine: strategies, capacity, fairness and the atomic claim

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use futures::future::join_all;
use inbox_engine::integration::LoggingDispatcher;
use inbox_engine::prelude::*;

#[tokio::test]
async fn test_capacity_and_presence_limit_a_pass() {
    let fx = fixture().await;
    fx.agent("a1", 2, true).await;
    fx.agent("a2", 1, false).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a1", "a2"]).await;

    let s1 = fx.queued_session(Some(&team.team_id), "c1", 30).await;
    let s2 = fx.queued_session(Some(&team.team_id), "c2", 20).await;
    let s3 = fx.queued_session(Some(&team.team_id), "c3", 10).await;

    let summary = fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(summary.assigned, 2);

    let s1 = fx.session(&s1.session_id).await;
    let s2 = fx.session(&s2.session_id).await;
    let s3 = fx.session(&s3.session_id).await;
    assert_eq!(s1.assigned_agent_id.as_deref(), Some("a1"));
    assert_eq!(s2.assigned_agent_id.as_deref(), Some("a1"));
    assert_eq!(s3.status, SessionStatus::Unassigned);
    assert!(s3.assigned_agent_id.is_none());

    // A second pass has nothing left to give
    let again = fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(again.assigned, 0);
}

#[tokio::test]
async fn test_round_robin_spreads_sessions_evenly() {
    let fx = fixture().await;
    for agent in ["a", "b", "c"] {
        fx.agent(agent, 5, true).await;
    }
    let team = fx.team("Sales", RoutingStrategy::RoundRobin, &["c", "a", "b"]).await;

    let mut sessions = Vec::new();
    for i in 0..6 {
        sessions.push(fx.queued_session(Some(&team.team_id), &format!("c{}", i), 60 - i).await);
    }

    let summary = fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(summary.assigned, 6);

    let mut per_agent: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::new();
    for s in &sessions {
        let agent = fx.session(&s.session_id).await.assigned_agent_id.unwrap();
        *per_agent.entry(agent.clone()).or_default() += 1;
        order.push(agent);
    }
    assert!(per_agent.values().all(|&n| n == 2), "uneven split: {:?}", per_agent);
    // Membership order is by user id, oldest session first
    assert_eq!(order, vec!["a", "b", "c", "a", "b", "c"]);
}

#[tokio::test]
async fn test_rotation_cursor_survives_between_passes() {
    let fx = fixture().await;
    fx.agent("a", 5, true).await;
    fx.agent("b", 5, true).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a", "b"]).await;

    let first = fx.queued_session(Some(&team.team_id), "c1", 10).await;
    fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(fx.session(&first.session_id).await.assigned_agent_id.as_deref(), Some("a"));

    let second = fx.queued_session(Some(&team.team_id), "c2", 5).await;
    fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(fx.session(&second.session_id).await.assigned_agent_id.as_deref(), Some("b"));

    let team = fx.api.get_team(&fx.supervisor, &team.team_id).await.unwrap();
    assert_eq!(team.rotation_cursor.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_priority_goes_first() {
    let fx = fixture().await;
    fx.agent("a", 1, true).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a"]).await;

    let old = fx.queued_session(Some(&team.team_id), "old", 60).await;
    let urgent = fx
        .api
        .database()
        .create_session(
            TENANT,
            &NewSession::new("vip", "whatsapp").with_team(&team.team_id).with_priority(10),
            Utc::now() - Duration::minutes(1),
        )
        .await
        .unwrap();

    fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();
    assert_eq!(fx.session(&urgent.session_id).await.status, SessionStatus::Assigned);
    assert_eq!(fx.session(&old.session_id).await.status, SessionStatus::Unassigned);
}

#[tokio::test]
async fn test_specific_agents_only_routes_to_allow_list() {
    let fx = fixture().await;
    for agent in ["a", "b", "c"] {
        fx.agent(agent, 5, true).await;
    }
    let team = fx.team("VIP", RoutingStrategy::RoundRobin, &["a", "b", "c"]).await;
    fx.api
        .set_assignment_config(
            &fx.supervisor,
            Some(&team.team_id),
            true,
            RoutingStrategy::SpecificAgents,
            StrategySettings {
                agent_ids: vec!["c".into(), "a".into()],
                ..StrategySettings::default()
            },
        )
        .await
        .unwrap();

    let mut sessions = Vec::new();
    for i in 0..4 {
        sessions.push(fx.queued_session(Some(&team.team_id), &format!("c{}", i), 40 - i).await);
    }
    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 4);

    let mut order = Vec::new();
    for s in &sessions {
        order.push(fx.session(&s.session_id).await.assigned_agent_id.unwrap());
    }
    assert_eq!(order, vec!["c", "a", "c", "a"]);
}

#[tokio::test]
async fn test_specific_agents_needs_an_allow_list() {
    let fx = fixture().await;
    let team = fx.team("VIP", RoutingStrategy::RoundRobin, &[]).await;
    let err = fx
        .api
        .set_assignment_config(
            &fx.supervisor,
            Some(&team.team_id),
            true,
            RoutingStrategy::SpecificAgents,
            StrategySettings::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_manual_strategy_waits_for_claims() {
    let fx = fixture().await;
    fx.agent("a", 2, true).await;
    fx.agent("outsider", 2, true).await;
    let team = fx.team("Manual", RoutingStrategy::Manual, &["a"]).await;
    let session = fx.queued_session(Some(&team.team_id), "c1", 5).await;

    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 0);
    assert_eq!(fx.session(&session.session_id).await.status, SessionStatus::Unassigned);

    let err = fx
        .api
        .claim_session(&agent_actor("outsider"), &session.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Forbidden(_)));

    let outcome = fx.api.claim_session(&agent_actor("a"), &session.session_id).await.unwrap();
    assert_eq!(outcome, ClaimOutcome::Claimed { agent_id: "a".into() });

    let again = fx.api.claim_session(&agent_actor("a"), &session.session_id).await.unwrap();
    assert_eq!(again, ClaimOutcome::AlreadyClaimed);

    // Manual claims leave the rotation alone
    let team = fx.api.get_team(&fx.supervisor, &team.team_id).await.unwrap();
    assert_eq!(team.rotation_cursor, None);
}

#[tokio::test]
async fn test_claim_respects_presence_and_capacity() {
    let fx = fixture().await;
    fx.agent("a", 1, false).await;
    let team = fx.team("Manual", RoutingStrategy::Manual, &["a"]).await;
    let first = fx.queued_session(Some(&team.team_id), "c1", 5).await;
    let second = fx.queued_session(Some(&team.team_id), "c2", 4).await;

    let offline = fx.api.claim_session(&agent_actor("a"), &first.session_id).await.unwrap();
    assert_eq!(offline, ClaimOutcome::AgentUnavailable);

    fx.api
        .set_presence(&agent_actor("a"), AgentStatus::Online, None)
        .await
        .unwrap();
    assert!(fx.api.claim_session(&agent_actor("a"), &first.session_id).await.unwrap().is_claimed());

    let full = fx.api.claim_session(&agent_actor("a"), &second.session_id).await.unwrap();
    assert_eq!(full, ClaimOutcome::AgentUnavailable);
    assert_eq!(fx.api.active_chat_count(&fx.supervisor, "a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_capacity_holds_across_teams() {
    let fx = fixture().await;
    fx.agent("a", 1, true).await;
    let support = fx.team("Support", RoutingStrategy::RoundRobin, &["a"]).await;
    let sales = fx.team("Sales", RoutingStrategy::RoundRobin, &["a"]).await;
    fx.queued_session(Some(&support.team_id), "c1", 5).await;
    fx.queued_session(Some(&sales.team_id), "c2", 5).await;

    let summary = fx.api.assign_queue(&fx.supervisor, None).await.unwrap();
    assert_eq!(summary.assigned, 1);
    assert_eq!(fx.api.active_chat_count(&fx.supervisor, "a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_shift_gate_applies_only_when_enforced() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    let team = fx.team("Night", RoutingStrategy::RoundRobin, &["a"]).await;
    fx.api
        .set_shift_enforcement(&fx.supervisor, &team.team_id, true)
        .await
        .unwrap();

    let session = fx.queued_session(Some(&team.team_id), "c1", 5).await;
    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 0);

    let now = Utc::now();
    fx.api
        .add_shift(&fx.supervisor, Some(&team.team_id), "a", now - Duration::hours(1), now + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 1);
    assert_eq!(fx.session(&session.session_id).await.assigned_agent_id.as_deref(), Some("a"));
}

#[tokio::test]
async fn test_assign_queue_requires_permission() {
    let fx = fixture().await;
    let err = fx.api.assign_queue(&agent_actor("a"), None).await.unwrap_err();
    assert!(matches!(err, InboxError::Forbidden(_)));
}

#[tokio::test]
async fn test_assignment_emits_audit_events() {
    let fx = fixture().await;
    let mut events = fx.audit.subscribe();
    fx.agent("a", 2, true).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a"]).await;
    let session = fx.queued_session(Some(&team.team_id), "c1", 5).await;

    fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap();

    let mut assigned = None;
    while let Ok(event) = events.try_recv() {
        if event.action == inbox_engine::integration::AuditAction::SessionAssigned {
            assigned = Some(event);
        }
    }
    let event = assigned.expect("session.assigned event");
    assert_eq!(event.resource_id, session.session_id);
    assert_eq!(event.actor_id, "supervisor-1");
    assert_eq!(event.details["agent_id"], "a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("inbox.db").display());
    let db = DatabaseManager::new(&url).await.unwrap();
    let fx = fixture_on(db, test_config(), Arc::new(LoggingDispatcher));

    let agents = ["a", "b", "c", "d"];
    for agent in agents {
        fx.agent(agent, 20, true).await;
    }
    let team = fx.team("Manual", RoutingStrategy::Manual, &agents).await;
    let actors: Vec<Actor> = agents.iter().map(|a| agent_actor(a)).collect();

    for i in 0..10 {
        let session = fx.queued_session(Some(&team.team_id), &format!("c{}", i), 5).await;
        let outcomes: Vec<ClaimOutcome> = join_all(
            actors
                .iter()
                .map(|actor| fx.api.claim_session(actor, &session.session_id)),
        )
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

        let winners = outcomes.iter().filter(|o| o.is_claimed()).count();
        assert_eq!(winners, 1, "outcomes: {:?}", outcomes);
        assert_eq!(
            outcomes.iter().filter(|o| **o == ClaimOutcome::AlreadyClaimed).count(),
            agents.len() - 1
        );

        let stored = fx.session(&session.session_id).await;
        assert_eq!(stored.status, SessionStatus::Assigned);
        assert_eq!(stored.version, 1);
        assert!(stored.assigned_agent_id.is_some());
        assert_eq!(stored.assigned_team_id.as_deref(), Some(team.team_id.as_str()));
    }
}
