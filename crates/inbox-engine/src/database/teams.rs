//! Team registry persistence: teams, membership, assignment configuration,
//! shifts and wrap-up forms.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::{parse_column, DatabaseManager};
use crate::error::{InboxError, Result};
use crate::resolution::WrapUpForm;
use crate::team::{
    AssignmentConfig, NewTeam, RoutingStrategy, Shift, StrategySettings, Team, TeamMember, TeamRole,
    TENANT_WIDE_SCOPE,
};

const TEAM_COLUMNS: &str =
    "team_id, tenant_id, name, description, routing_strategy, shift_enforcement, rotation_cursor, created_at";

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    let strategy: String = row.try_get("routing_strategy")?;
    Ok(Team {
        team_id: row.try_get("team_id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        routing_strategy: parse_column(&strategy, "teams.routing_strategy")?,
        shift_enforcement: row.try_get("shift_enforcement")?,
        rotation_cursor: row.try_get("rotation_cursor")?,
        created_at: row.try_get("created_at")?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<TeamMember> {
    let role: String = row.try_get("role")?;
    Ok(TeamMember {
        team_id: row.try_get("team_id")?,
        user_id: row.try_get("user_id")?,
        role: parse_column(&role, "team_members.role")?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn config_from_row(row: &SqliteRow) -> Result<AssignmentConfig> {
    let scope: String = row.try_get("scope")?;
    let strategy: String = row.try_get("strategy")?;
    let settings: String = row.try_get("settings")?;
    Ok(AssignmentConfig {
        tenant_id: row.try_get("tenant_id")?,
        team_id: (scope != TENANT_WIDE_SCOPE).then_some(scope),
        enabled: row.try_get("enabled")?,
        strategy: parse_column(&strategy, "assignment_configs.strategy")?,
        settings: serde_json::from_str::<StrategySettings>(&settings)?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn shift_from_row(row: &SqliteRow) -> Result<Shift> {
    Ok(Shift {
        shift_id: row.try_get("shift_id")?,
        tenant_id: row.try_get("tenant_id")?,
        team_id: row.try_get("team_id")?,
        user_id: row.try_get("user_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
    })
}

impl DatabaseManager {
    pub async fn create_team(&self, tenant_id: &str, team: &NewTeam, now: DateTime<Utc>) -> Result<Team> {
        let team_id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO teams (team_id, tenant_id, name, description, routing_strategy, shift_enforcement, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&team_id)
        .bind(tenant_id)
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.routing_strategy.as_str())
        .bind(team.shift_enforcement)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Team {} ({}) created for tenant {}", team.name, team_id, tenant_id);
        Ok(Team {
            team_id,
            tenant_id: tenant_id.to_string(),
            name: team.name.clone(),
            description: team.description.clone(),
            routing_strategy: team.routing_strategy,
            shift_enforcement: team.shift_enforcement,
            rotation_cursor: None,
            created_at: now,
        })
    }

    pub async fn get_team(&self, tenant_id: &str, team_id: &str) -> Result<Option<Team>> {
        let sql = format!("SELECT {} FROM teams WHERE team_id = ? AND tenant_id = ?", TEAM_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(team_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(team_from_row).transpose()
    }

    pub async fn list_teams(&self, tenant_id: &str) -> Result<Vec<Team>> {
        let sql = format!("SELECT {} FROM teams WHERE tenant_id = ? ORDER BY name, team_id", TEAM_COLUMNS);
        let rows = sqlx::query(&sql).bind(tenant_id).fetch_all(&self.pool).await?;

        rows.iter().map(team_from_row).collect()
    }

    /// Change a team's strategy label and shift gate
    pub async fn update_team_routing(
        &self,
        tenant_id: &str,
        team_id: &str,
        routing_strategy: RoutingStrategy,
        shift_enforcement: bool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE teams SET routing_strategy = ?, shift_enforcement = ? WHERE team_id = ? AND tenant_id = ?",
        )
        .bind(routing_strategy.as_str())
        .bind(shift_enforcement)
        .bind(team_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Current rotation cursor, read fresh for every assignment pass
    pub async fn rotation_cursor(&self, team_id: &str) -> Result<Option<String>> {
        let cursor: Option<(Option<String>,)> =
            sqlx::query_as("SELECT rotation_cursor FROM teams WHERE team_id = ?")
                .bind(team_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(cursor.and_then(|(c,)| c))
    }

    /// Add a member, or update the role of an existing one
    pub async fn add_team_member(
        &self,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
        now: DateTime<Utc>,
    ) -> Result<TeamMember> {
        sqlx::query(
            "INSERT INTO team_members (team_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(team_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT team_id, user_id, role, joined_at FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        member_from_row(&row)
    }

    pub async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = ? AND user_id = ?")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Members ordered by user id, the deterministic rotation order
    pub async fn list_team_members(&self, team_id: &str) -> Result<Vec<TeamMember>> {
        let rows = sqlx::query(
            "SELECT team_id, user_id, role, joined_at FROM team_members WHERE team_id = ? ORDER BY user_id",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(member_from_row).collect()
    }

    /// Write a team-scoped (`team_id = Some`) or tenant-wide configuration
    pub async fn upsert_assignment_config(
        &self,
        tenant_id: &str,
        team_id: Option<&str>,
        enabled: bool,
        strategy: RoutingStrategy,
        settings: &StrategySettings,
        now: DateTime<Utc>,
    ) -> Result<AssignmentConfig> {
        let scope = team_id.unwrap_or(TENANT_WIDE_SCOPE);
        let settings_json = serde_json::to_string(settings)?;

        sqlx::query(
            "INSERT INTO assignment_configs (tenant_id, scope, enabled, strategy, settings, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id, scope) DO UPDATE SET
                 enabled = excluded.enabled,
                 strategy = excluded.strategy,
                 settings = excluded.settings,
                 updated_at = excluded.updated_at",
        )
        .bind(tenant_id)
        .bind(scope)
        .bind(enabled)
        .bind(strategy.as_str())
        .bind(&settings_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(AssignmentConfig {
            tenant_id: tenant_id.to_string(),
            team_id: team_id.map(str::to_string),
            enabled,
            strategy,
            settings: settings.clone(),
            updated_at: now,
        })
    }

    /// Team-scoped configuration if present, else the tenant-wide one
    pub async fn effective_assignment_config(&self, tenant_id: &str, team_id: &str) -> Result<Option<AssignmentConfig>> {
        let row = sqlx::query(
            "SELECT tenant_id, scope, enabled, strategy, settings, updated_at
             FROM assignment_configs
             WHERE tenant_id = ? AND scope IN (?, ?)
             ORDER BY CASE WHEN scope = ? THEN 1 ELSE 0 END
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(team_id)
        .bind(TENANT_WIDE_SCOPE)
        .bind(TENANT_WIDE_SCOPE)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(config_from_row).transpose()
    }

    pub async fn add_shift(
        &self,
        tenant_id: &str,
        team_id: Option<&str>,
        user_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Shift> {
        if start_time >= end_time {
            return Err(InboxError::validation("shift start must be before its end"));
        }

        let shift_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO shifts (shift_id, tenant_id, team_id, user_id, start_time, end_time)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&shift_id)
        .bind(tenant_id)
        .bind(team_id)
        .bind(user_id)
        .bind(start_time)
        .bind(end_time)
        .execute(&self.pool)
        .await?;

        Ok(Shift {
            shift_id,
            tenant_id: tenant_id.to_string(),
            team_id: team_id.map(str::to_string),
            user_id: user_id.to_string(),
            start_time,
            end_time,
        })
    }

    pub async fn list_shifts(&self, tenant_id: &str, user_id: &str) -> Result<Vec<Shift>> {
        let rows = sqlx::query(
            "SELECT shift_id, tenant_id, team_id, user_id, start_time, end_time
             FROM shifts WHERE tenant_id = ? AND user_id = ? ORDER BY start_time",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(shift_from_row).collect()
    }

    /// Users on duty for a team at `now`
    pub async fn on_shift_agents(&self, tenant_id: &str, team_id: &str, now: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT user_id FROM shifts
             WHERE tenant_id = ? AND (team_id = ? OR team_id IS NULL)
               AND start_time <= ? AND end_time > ?",
        )
        .bind(tenant_id)
        .bind(team_id)
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(user,)| user).collect())
    }

    pub async fn upsert_wrap_up_form(
        &self,
        tenant_id: &str,
        team_id: &str,
        form: &WrapUpForm,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let fields = serde_json::to_string(&form.fields)?;
        sqlx::query(
            "INSERT INTO wrap_up_forms (team_id, tenant_id, mandatory, fields, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(team_id) DO UPDATE SET
                 mandatory = excluded.mandatory,
                 fields = excluded.fields,
                 updated_at = excluded.updated_at",
        )
        .bind(team_id)
        .bind(tenant_id)
        .bind(form.mandatory)
        .bind(&fields)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_wrap_up_form(&self, tenant_id: &str, team_id: &str) -> Result<Option<WrapUpForm>> {
        let row: Option<(bool, String)> = sqlx::query_as(
            "SELECT mandatory, fields FROM wrap_up_forms WHERE team_id = ? AND tenant_id = ?",
        )
        .bind(team_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(mandatory, fields)| {
            Ok(WrapUpForm {
                mandatory,
                fields: serde_json::from_str(&fields)?,
            })
        })
        .transpose()
    }

    pub async fn delete_wrap_up_form(&self, tenant_id: &str, team_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wrap_up_forms WHERE team_id = ? AND tenant_id = ?")
            .bind(team_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
