//! Resolution workflow

mod common;

use std::collections::HashMap;

use common::*;
use inbox_engine::prelude::*;

fn outcome_form() -> WrapUpForm {
    WrapUpForm {
        mandatory: true,
        fields: vec![
            WrapUpField::select("outcome", "Outcome", &["sale", "no_sale", "callback"]).required(),
            WrapUpField::text("order_ref", "Order reference"),
        ],
    }
}

fn configured(values: &[(&str, &str)]) -> ResolveRequest {
    ResolveRequest::new(WrapUpPayload::Configured {
        values: values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    })
}

fn default_payload(category: Option<ResolutionCategory>, notes: Option<&str>) -> ResolveRequest {
    ResolveRequest::new(WrapUpPayload::Default {
        category,
        notes: notes.map(str::to_string),
    })
}

#[tokio::test]
async fn test_mandatory_form_blocks_until_filled() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    let team = fx.team("Sales", RoutingStrategy::Manual, &["a"]).await;
    fx.api.set_wrap_up_form(&fx.supervisor, &team.team_id, outcome_form()).await.unwrap();
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;
    let me = agent_actor("a");

    let err = fx
        .api
        .resolve_session(&me, &session.session_id, configured(&[("outcome", "  ")]))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .resolve_session(&me, &session.session_id, ResolveRequest::new(WrapUpPayload::Skip))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .resolve_session(&me, &session.session_id, configured(&[("outcome", "refund")]))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    // Still open after the rejected attempts
    assert_eq!(fx.session(&session.session_id).await.status, SessionStatus::Assigned);

    let outcome = fx
        .api
        .resolve_session(&me, &session.session_id, configured(&[("outcome", "sale"), ("order_ref", "A-17")]))
        .await
        .unwrap();
    let ResolveOutcome::Resolved { resolution } = outcome else {
        panic!("expected resolution, got {:?}", outcome);
    };
    assert_eq!(resolution.fields["outcome"], "sale");
    assert_eq!(resolution.fields["order_ref"], "A-17");
    assert_eq!(resolution.category, None);
    assert_eq!(resolution.outcome, "resolved");
    assert_eq!(resolution.resolved_by_agent_id, "a");

    let closed = fx.session(&session.session_id).await;
    assert_eq!(closed.status, SessionStatus::Resolved);
    let stored = fx.api.get_resolution(&fx.supervisor, &session.session_id).await.unwrap();
    assert_eq!(closed.resolved_at, Some(stored.resolved_at));
    assert_eq!(stored.fields, resolution.fields);
}

#[tokio::test]
async fn test_optional_form_allows_skip() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    let team = fx.team("Sales", RoutingStrategy::Manual, &["a"]).await;
    let mut form = outcome_form();
    form.mandatory = false;
    fx.api.set_wrap_up_form(&fx.supervisor, &team.team_id, form).await.unwrap();
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;

    let mut request = ResolveRequest::new(WrapUpPayload::Skip);
    request.outcome = Some("spam".to_string());
    let outcome = fx.api.resolve_session(&agent_actor("a"), &session.session_id, request).await.unwrap();
    let ResolveOutcome::Resolved { resolution } = outcome else {
        panic!("expected resolution, got {:?}", outcome);
    };
    assert!(resolution.fields.is_empty());
    assert_eq!(resolution.outcome, "spam");
}

#[tokio::test]
async fn test_default_form_needs_a_category() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;
    let me = agent_actor("a");

    let err = fx
        .api
        .resolve_session(&me, &session.session_id, default_payload(None, Some("called back")))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .resolve_session(&me, &session.session_id, ResolveRequest::new(WrapUpPayload::Skip))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let outcome = fx
        .api
        .resolve_session(
            &me,
            &session.session_id,
            default_payload(Some(ResolutionCategory::Billing), Some("  refund issued ")),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ResolveOutcome::Resolved { .. }));

    let stored = fx.api.get_resolution(&fx.supervisor, &session.session_id).await.unwrap();
    assert_eq!(stored.category, Some(ResolutionCategory::Billing));
    assert_eq!(stored.notes.as_deref(), Some("refund issued"));
}

#[tokio::test]
async fn test_only_assignee_or_supervisor_resolves() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    fx.agent("b", 3, true).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a", "b"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;
    let request = default_payload(Some(ResolutionCategory::Other), None);

    let err = fx
        .api
        .resolve_session(&agent_actor("b"), &session.session_id, request.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Forbidden(_)));

    let outcome = fx
        .api
        .resolve_session(&fx.supervisor, &session.session_id, request.clone())
        .await
        .unwrap();
    let ResolveOutcome::Resolved { resolution } = outcome else {
        panic!("expected resolution, got {:?}", outcome);
    };
    assert_eq!(resolution.resolved_by_agent_id, "supervisor-1");

    // Second close is reported, not applied
    let again = fx
        .api
        .resolve_session(&agent_actor("a"), &session.session_id, request)
        .await
        .unwrap();
    assert_eq!(again, ResolveOutcome::AlreadyResolved);
}

#[tokio::test]
async fn test_unassigned_sessions_cannot_be_resolved() {
    let fx = fixture().await;
    let team = fx.team("Support", RoutingStrategy::Manual, &[]).await;
    let session = fx.queued_session(Some(&team.team_id), "c1", 5).await;

    let err = fx
        .api
        .resolve_session(&fx.supervisor, &session.session_id, default_payload(Some(ResolutionCategory::Other), None))
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Conflict(_)));

    let err = fx
        .api
        .resolve_session(&fx.supervisor, "missing", default_payload(Some(ResolutionCategory::Other), None))
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::NotFound(_)));
}

#[tokio::test]
async fn test_resolved_sessions_are_final() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    fx.agent("b", 3, true).await;
    let team = fx.team("Support", RoutingStrategy::RoundRobin, &["a", "b"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;
    fx.api
        .resolve_session(
            &agent_actor("a"),
            &session.session_id,
            default_payload(Some(ResolutionCategory::Other), None),
        )
        .await
        .unwrap();
    let closed = fx.session(&session.session_id).await;

    assert_eq!(
        fx.api.claim_session(&agent_actor("b"), &session.session_id).await.unwrap(),
        ClaimOutcome::AlreadyClaimed
    );
    assert_eq!(fx.api.assign_queue(&fx.supervisor, Some(&team.team_id)).await.unwrap().assigned, 0);

    let request = BulkTransferRequest {
        session_ids: vec![session.session_id.clone()],
        target_agent_id: Some("b".to_string()),
        target_team_id: None,
        reason: None,
    };
    let result = fx.api.bulk_transfer(&fx.supervisor, &request).await.unwrap();
    assert_eq!(result.results[0].outcome, TransferOutcome::AlreadyResolved);

    let after = fx.session(&session.session_id).await;
    assert_eq!(after, closed);
    assert_eq!(fx.api.active_chat_count(&fx.supervisor, "a").await.unwrap(), 0);
}

#[tokio::test]
async fn test_csat_is_attached_to_the_resolution() {
    let fx = fixture().await;
    fx.agent("a", 3, true).await;
    let team = fx.team("Support", RoutingStrategy::Manual, &["a"]).await;
    let session = fx.assigned_session(&team.team_id, "a", "c1").await;

    let err = fx.api.record_csat(TENANT, &session.session_id, 4, None).await.unwrap_err();
    assert!(matches!(err, InboxError::NotFound(_)));

    fx.api
        .resolve_session(
            &agent_actor("a"),
            &session.session_id,
            default_payload(Some(ResolutionCategory::GeneralInquiry), None),
        )
        .await
        .unwrap();

    assert!(fx.api.record_csat(TENANT, &session.session_id, 6, None).await.unwrap_err().is_validation());

    let resolution = fx
        .api
        .record_csat(TENANT, &session.session_id, 5, Some("quick and friendly"))
        .await
        .unwrap();
    assert_eq!(resolution.csat_score, Some(5));
    assert_eq!(resolution.csat_feedback.as_deref(), Some("quick and friendly"));
    assert!(resolution.csat_recorded_at.is_some());
}

#[tokio::test]
async fn test_form_definition_management() {
    let fx = fixture().await;
    let team = fx.team("Sales", RoutingStrategy::Manual, &[]).await;

    let broken = WrapUpForm {
        mandatory: false,
        fields: vec![WrapUpField::select("reason", "Reason", &[])],
    };
    let err = fx.api.set_wrap_up_form(&fx.supervisor, &team.team_id, broken).await.unwrap_err();
    assert!(err.is_validation());

    let err = fx
        .api
        .set_wrap_up_form(&agent_actor("a"), &team.team_id, outcome_form())
        .await
        .unwrap_err();
    assert!(matches!(err, InboxError::Forbidden(_)));

    fx.api.set_wrap_up_form(&fx.supervisor, &team.team_id, outcome_form()).await.unwrap();
    assert_eq!(
        fx.api.get_wrap_up_form(&fx.supervisor, &team.team_id).await.unwrap(),
        Some(outcome_form())
    );

    assert!(fx.api.clear_wrap_up_form(&fx.supervisor, &team.team_id).await.unwrap());
    assert_eq!(fx.api.get_wrap_up_form(&fx.supervisor, &team.team_id).await.unwrap(), None);
}
