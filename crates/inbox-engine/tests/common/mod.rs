//! Shared fixtures for the inbox integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use inbox_engine::integration::{BroadcastAuditSink, LoggingDispatcher, MessageReceipt};
use inbox_engine::prelude::*;

pub const TENANT: &str = "tenant-1";

pub struct Fixture {
    pub api: InboxApi,
    pub supervisor: Actor,
    pub audit: Arc<BroadcastAuditSink>,
}

pub fn test_config() -> InboxConfig {
    let mut config = InboxConfig::default();
    config.assignment.periodic_enabled = false;
    config.registry.cache_ttl_secs = 0;
    config
}

pub async fn fixture() -> Fixture {
    fixture_with(test_config(), Arc::new(LoggingDispatcher)).await
}

pub async fn fixture_with(config: InboxConfig, dispatcher: Arc<dyn MessageDispatcher>) -> Fixture {
    let db = DatabaseManager::new_in_memory().await.expect("in-memory database");
    fixture_on(db, config, dispatcher)
}

pub fn fixture_on(db: DatabaseManager, config: InboxConfig, dispatcher: Arc<dyn MessageDispatcher>) -> Fixture {
    let audit = Arc::new(BroadcastAuditSink::new(256));
    let api = InboxApi::new(db, &config, dispatcher, audit.clone());
    Fixture {
        api,
        supervisor: Actor::supervisor(TENANT, "supervisor-1"),
        audit,
    }
}

pub fn agent_actor(agent_id: &str) -> Actor {
    Actor::new(TENANT, agent_id)
}

impl Fixture {
    /// Team with the given members and an enabled assignment config
    pub async fn team(&self, name: &str, strategy: RoutingStrategy, members: &[&str]) -> Team {
        let team = self
            .api
            .create_team(
                &self.supervisor,
                NewTeam {
                    name: name.to_string(),
                    description: None,
                    routing_strategy: strategy,
                    shift_enforcement: false,
                },
            )
            .await
            .expect("create team");

        for member in members {
            self.api
                .add_member(&self.supervisor, &team.team_id, member, TeamRole::Member)
                .await
                .expect("add member");
        }

        let settings = match strategy {
            RoutingStrategy::SpecificAgents => StrategySettings {
                agent_ids: members.iter().map(|m| m.to_string()).collect(),
                ..StrategySettings::default()
            },
            _ => StrategySettings::default(),
        };
        self.api
            .set_assignment_config(&self.supervisor, Some(&team.team_id), true, strategy, settings)
            .await
            .expect("assignment config");

        team
    }

    /// Registered agent, optionally brought online
    pub async fn agent(&self, agent_id: &str, capacity: u32, online: bool) -> AgentProfile {
        let profile = self
            .api
            .upsert_agent(&self.supervisor, agent_id, agent_id, Some(capacity))
            .await
            .expect("upsert agent");
        if !online {
            return profile;
        }
        self.api
            .set_presence(&agent_actor(agent_id), AgentStatus::Online, None)
            .await
            .expect("set presence")
    }

    /// Session queued to `team_id` whose last activity was `minutes_ago`
    pub async fn queued_session(&self, team_id: Option<&str>, contact: &str, minutes_ago: i64) -> InboxSession {
        let mut new = NewSession::new(contact, "whatsapp").with_contact_name(format!("Contact {}", contact));
        if let Some(team_id) = team_id {
            new = new.with_team(team_id);
        }
        self.api
            .database()
            .create_session(TENANT, &new, Utc::now() - Duration::minutes(minutes_ago))
            .await
            .expect("create session")
    }

    pub async fn session(&self, session_id: &str) -> InboxSession {
        self.api
            .get_session(&self.supervisor, session_id)
            .await
            .expect("get session")
    }

    /// Assign one session directly to an agent
    pub async fn assigned_session(&self, team_id: &str, agent_id: &str, contact: &str) -> InboxSession {
        let session = self.queued_session(Some(team_id), contact, 5).await;
        let outcome = self
            .api
            .claim_session(&agent_actor(agent_id), &session.session_id)
            .await
            .expect("claim");
        assert!(outcome.is_claimed(), "claim of {} by {} failed: {:?}", session.session_id, agent_id, outcome);
        self.session(&session.session_id).await
    }
}

/// Dispatcher that fails for a fixed set of contacts and records the rest
#[derive(Default)]
pub struct ScriptedDispatcher {
    pub failing_contacts: Vec<String>,
    pub sent: std::sync::Mutex<Vec<(String, String, HashMap<String, String>)>>,
}

impl ScriptedDispatcher {
    pub fn failing_for(contacts: &[&str]) -> Self {
        Self {
            failing_contacts: contacts.iter().map(|c| c.to_string()).collect(),
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageDispatcher for ScriptedDispatcher {
    async fn send_template_message(
        &self,
        contact_id: &str,
        template_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<MessageReceipt> {
        if self.failing_contacts.iter().any(|c| c == contact_id) {
            return Err(InboxError::integration(format!("gateway rejected message to {}", contact_id)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((contact_id.to_string(), template_id.to_string(), params.clone()));
        Ok(MessageReceipt {
            message_id: format!("msg-{}", contact_id),
        })
    }
}

pub fn minutes_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    (b - a).num_milliseconds() as f64 / 60_000.0
}
