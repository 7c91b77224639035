use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::database::{DatabaseManager, ResolutionWrite};
use crate::error::{InboxError, Result};
use crate::integration::{AuditAction, AuditEvent, AuditSink};
use crate::resolution::{
    Resolution, ResolutionCategory, ResolveOutcome, ResolveRequest, WrapUpForm, WrapUpPayload, DEFAULT_OUTCOME,
};
use crate::session::SessionStatus;
use crate::team::TeamRegistry;

/// Wrap-up data after validation against the team's form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedWrapUp {
    pub category: Option<ResolutionCategory>,
    pub notes: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Validate a wrap-up payload against the team's form (or the default form
/// when the team has none)
pub fn prepare_wrap_up(form: Option<&WrapUpForm>, payload: &WrapUpPayload) -> Result<PreparedWrapUp> {
    match (form, payload) {
        (None, WrapUpPayload::Default { category, notes }) => {
            let category = (*category).ok_or_else(|| InboxError::validation("a resolution category is required"))?;
            Ok(PreparedWrapUp {
                category: Some(category),
                notes: notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(String::from),
                fields: BTreeMap::new(),
            })
        }
        (None, WrapUpPayload::Configured { .. }) => Err(InboxError::validation(
            "the team has no wrap-up form; submit a category instead",
        )),
        (None, WrapUpPayload::Skip) => Err(InboxError::validation(
            "skipping the wrap-up requires a non-mandatory team form",
        )),
        (Some(form), WrapUpPayload::Configured { values }) => Ok(PreparedWrapUp {
            fields: form.validate_submission(values)?,
            ..PreparedWrapUp::default()
        }),
        (Some(form), WrapUpPayload::Skip) => {
            if form.allows_skip() {
                Ok(PreparedWrapUp::default())
            } else {
                Err(InboxError::validation("the team's wrap-up form is mandatory and cannot be skipped"))
            }
        }
        (Some(_), WrapUpPayload::Default { .. }) => Err(InboxError::validation(
            "the team uses a configured wrap-up form; submit its field values",
        )),
    }
}

pub struct ResolutionWorkflow {
    db: DatabaseManager,
    registry: Arc<TeamRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl ResolutionWorkflow {
    pub fn new(db: DatabaseManager, registry: Arc<TeamRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self { db, registry, audit }
    }

    pub async fn set_wrap_up_form(&self, tenant_id: &str, team_id: &str, form: WrapUpForm, actor_id: &str) -> Result<()> {
        form.validate_definition()?;
        self.registry.get_team(tenant_id, team_id).await?;
        self.db.upsert_wrap_up_form(tenant_id, team_id, &form, Utc::now()).await?;

        info!(
            "📝 Wrap-up form for team {} set ({} fields, mandatory: {})",
            team_id,
            form.fields.len(),
            form.mandatory
        );
        self.audit.emit(
            AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id).with_details(json!({
                "wrap_up_fields": form.fields.len(),
                "mandatory": form.mandatory,
            })),
        );
        Ok(())
    }

    pub async fn get_wrap_up_form(&self, tenant_id: &str, team_id: &str) -> Result<Option<WrapUpForm>> {
        self.registry.get_team(tenant_id, team_id).await?;
        self.db.get_wrap_up_form(tenant_id, team_id).await
    }

    /// Remove a team's form; the team falls back to the default category form
    pub async fn clear_wrap_up_form(&self, tenant_id: &str, team_id: &str, actor_id: &str) -> Result<bool> {
        let removed = self.db.delete_wrap_up_form(tenant_id, team_id).await?;
        if removed {
            self.audit.emit(
                AuditEvent::new(AuditAction::TeamConfigChanged, tenant_id, actor_id, team_id)
                    .with_details(json!({ "wrap_up_form": null })),
            );
        }
        Ok(removed)
    }

    /// Close an assigned session with its wrap-up
    ///
    /// Only the assigned agent may resolve, unless `can_override` is set for
    /// a supervisor. The transition and the resolution record are written
    /// together and are conditional on the assignee read here.
    pub async fn resolve_session(
        &self,
        tenant_id: &str,
        actor_id: &str,
        can_override: bool,
        session_id: &str,
        request: ResolveRequest,
    ) -> Result<ResolveOutcome> {
        let session = self
            .db
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("session {}", session_id)))?;

        let assignee = match (session.status, session.assigned_agent_id.as_deref()) {
            (SessionStatus::Resolved, _) => return Ok(ResolveOutcome::AlreadyResolved),
            (SessionStatus::Assigned, Some(agent_id)) => agent_id.to_string(),
            _ => {
                return Err(InboxError::conflict(format!(
                    "session {} is not assigned to an agent",
                    session_id
                )))
            }
        };

        if assignee != actor_id && !can_override {
            return Err(InboxError::forbidden(format!(
                "session {} is assigned to another agent",
                session_id
            )));
        }

        let form = match session.assigned_team_id.as_deref() {
            Some(team_id) => self.db.get_wrap_up_form(tenant_id, team_id).await?,
            None => None,
        };
        let prepared = prepare_wrap_up(form.as_ref(), &request.wrap_up)?;

        let outcome = request
            .outcome
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(DEFAULT_OUTCOME)
            .to_string();

        let result = self
            .db
            .resolve_session(ResolutionWrite {
                tenant_id,
                session_id,
                expected_agent_id: &assignee,
                resolved_by: actor_id,
                category: prepared.category,
                notes: prepared.notes,
                outcome,
                fields: prepared.fields,
                now: Utc::now(),
            })
            .await?;

        match &result {
            ResolveOutcome::Resolved { resolution } => {
                info!("✅ Session {} resolved by {} ({})", session_id, actor_id, resolution.outcome);
                self.audit.emit(
                    AuditEvent::new(AuditAction::SessionResolved, tenant_id, actor_id, session_id).with_details(
                        json!({
                            "assigned_agent_id": assignee,
                            "team_id": session.assigned_team_id,
                            "category": resolution.category,
                            "outcome": resolution.outcome,
                        }),
                    ),
                );
            }
            ResolveOutcome::ConcurrentlyModified => {
                warn!("Session {} changed hands while resolving", session_id);
            }
            ResolveOutcome::AlreadyResolved => {}
        }

        Ok(result)
    }

    pub async fn get_resolution(&self, tenant_id: &str, session_id: &str) -> Result<Resolution> {
        self.db
            .get_resolution(tenant_id, session_id)
            .await?
            .ok_or_else(|| InboxError::not_found(format!("resolution of session {}", session_id)))
    }

    /// Attach a customer satisfaction score (1 to 5) to a resolution
    pub async fn record_csat(
        &self,
        tenant_id: &str,
        session_id: &str,
        score: u8,
        feedback: Option<&str>,
    ) -> Result<Resolution> {
        if !(1..=5).contains(&score) {
            return Err(InboxError::validation("csat score must be between 1 and 5"));
        }
        let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());

        if !self.db.record_csat(tenant_id, session_id, score, feedback, Utc::now()).await? {
            return Err(InboxError::not_found(format!("resolution of session {}", session_id)));
        }
        self.get_resolution(tenant_id, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::resolution::WrapUpField;

    fn form(mandatory: bool) -> WrapUpForm {
        WrapUpForm {
            mandatory,
            fields: vec![WrapUpField::select("reason", "Reason", &["billing", "other"]).required()],
        }
    }

    #[test]
    fn test_default_mode_requires_category() {
        let err = prepare_wrap_up(None, &WrapUpPayload::Default { category: None, notes: None }).unwrap_err();
        assert!(err.is_validation());

        let ok = prepare_wrap_up(
            None,
            &WrapUpPayload::Default {
                category: Some(ResolutionCategory::Billing),
                notes: Some("  ".into()),
            },
        )
        .unwrap();
        assert_eq!(ok.category, Some(ResolutionCategory::Billing));
        assert_eq!(ok.notes, None);
    }

    #[test]
    fn test_skip_only_with_optional_form() {
        assert!(prepare_wrap_up(None, &WrapUpPayload::Skip).is_err());
        assert!(prepare_wrap_up(Some(&form(true)), &WrapUpPayload::Skip).is_err());
        assert_eq!(
            prepare_wrap_up(Some(&form(false)), &WrapUpPayload::Skip).unwrap(),
            PreparedWrapUp::default()
        );
    }

    #[test]
    fn test_configured_values_are_validated() {
        let mut values = HashMap::new();
        let empty = WrapUpPayload::Configured { values: values.clone() };
        assert!(prepare_wrap_up(Some(&form(true)), &empty).is_err());

        values.insert("reason".to_string(), "billing".to_string());
        let prepared = prepare_wrap_up(Some(&form(true)), &WrapUpPayload::Configured { values }).unwrap();
        assert_eq!(prepared.fields.get("reason").map(String::as_str), Some("billing"));
        assert_eq!(prepared.category, None);
    }

    #[test]
    fn test_mode_must_match_form() {
        let default = WrapUpPayload::Default {
            category: Some(ResolutionCategory::Other),
            notes: None,
        };
        assert!(prepare_wrap_up(Some(&form(false)), &default).is_err());
        assert!(prepare_wrap_up(None, &WrapUpPayload::Configured { values: HashMap::new() }).is_err());
    }
}
