//! PostgreSQL-backed [`RegistrationStore`].

use async_trait::async_trait;
use prometheus::HistogramTimer;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    AllowedEmail, Athlete, AthleteFilter, AthleteScope, AuditFilter, AuditLogEntry, Coach,
    ConfigEntry, Dojo,
};
use crate::services::error::StoreError;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{RegistrationStore, StoreTx};

const ALLOWED_EMAIL_COLUMNS: &str = "id, email, is_admin, added_by, created_at";
const DOJO_COLUMNS: &str = "id, name, created_at";
const COACH_COLUMNS: &str =
    "id, email, full_name, phone, dojo_id, is_admin, onboarding_complete, created_at";
const ATHLETE_COLUMNS: &str = "id, coach_id, dojo_id, full_name, date_of_birth, gender, belt_rank, \
     weight_kg, competition_day, kata_event, kumite_event, created_at, updated_at";
const AUDIT_COLUMNS: &str = "seq, id, action, athlete_snapshot, coach_id, coach_email, dojo_name, \
     prev_hash, entry_hash, created_at";
const CONFIG_COLUMNS: &str = "key, value, updated_at, updated_by";

/// Advisory lock key serializing audit chain appends.
const AUDIT_CHAIN_LOCK: i64 = 0x0a0d_17c4_a1_ba5e;

fn timer(operation: &str) -> HistogramTimer {
    DB_QUERY_DURATION
        .with_label_values(&[operation])
        .start_timer()
}

/// `%term%` for ILIKE with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(like_pattern)
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "registration-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, StoreError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_allowed_email(&self, email: &str) -> Result<Option<AllowedEmail>, StoreError> {
        let _timer = timer("find_allowed_email");
        let row = sqlx::query_as::<_, AllowedEmail>(&format!(
            "SELECT {ALLOWED_EMAIL_COLUMNS} FROM allowed_emails WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn list_allowed_emails(&self) -> Result<Vec<AllowedEmail>, StoreError> {
        let _timer = timer("list_allowed_emails");
        let rows = sqlx::query_as::<_, AllowedEmail>(&format!(
            "SELECT {ALLOWED_EMAIL_COLUMNS} FROM allowed_emails ORDER BY email"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_dojos(&self) -> Result<Vec<Dojo>, StoreError> {
        let _timer = timer("list_dojos");
        let rows = sqlx::query_as::<_, Dojo>(&format!(
            "SELECT {DOJO_COLUMNS} FROM dojos ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn find_dojo(&self, id: Uuid) -> Result<Option<Dojo>, StoreError> {
        let _timer = timer("find_dojo");
        let row = sqlx::query_as::<_, Dojo>(&format!(
            "SELECT {DOJO_COLUMNS} FROM dojos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn find_coach(&self, id: Uuid) -> Result<Option<Coach>, StoreError> {
        let _timer = timer("find_coach");
        let row = sqlx::query_as::<_, Coach>(&format!(
            "SELECT {COACH_COLUMNS} FROM coaches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn list_coaches(&self) -> Result<Vec<Coach>, StoreError> {
        let _timer = timer("list_coaches");
        let rows = sqlx::query_as::<_, Coach>(&format!(
            "SELECT {COACH_COLUMNS} FROM coaches ORDER BY full_name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn find_athlete(&self, id: Uuid) -> Result<Option<Athlete>, StoreError> {
        let _timer = timer("find_athlete");
        let row = sqlx::query_as::<_, Athlete>(&format!(
            "SELECT {ATHLETE_COLUMNS} FROM athletes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, filter))]
    async fn list_athletes(
        &self,
        scope: AthleteScope,
        filter: &AthleteFilter,
    ) -> Result<Vec<Athlete>, StoreError> {
        let _timer = timer("list_athletes");
        let coach_id = match scope {
            AthleteScope::All => None,
            AthleteScope::Coach(id) => Some(id),
        };

        let rows = sqlx::query_as::<_, Athlete>(&format!(
            r#"
            SELECT {ATHLETE_COLUMNS}
            FROM athletes
            WHERE ($1::uuid IS NULL OR coach_id = $1)
              AND ($2::text IS NULL OR full_name ILIKE $2)
              AND ($3::text IS NULL OR competition_day = $3)
              AND ($4::text IS NULL OR belt_rank = $4)
            ORDER BY created_at DESC, id
            "#
        ))
        .bind(coach_id)
        .bind(non_blank(&filter.search))
        .bind(filter.competition_day.map(|d| d.as_str()))
        .bind(filter.belt_rank.map(|b| b.as_str()))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self, filter))]
    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let _timer = timer("list_audit_logs");
        let rows = sqlx::query_as::<_, AuditLogEntry>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM (
                SELECT {AUDIT_COLUMNS}
                FROM audit_logs
                WHERE ($1::text IS NULL OR action = $1)
                  AND ($2::text IS NULL OR coach_email ILIKE $2)
                  AND ($3::text IS NULL OR dojo_name ILIKE $3)
                ORDER BY seq DESC
                LIMIT $4
            ) newest
            ORDER BY seq ASC
            "#
        ))
        .bind(filter.action.map(|a| a.as_str()))
        .bind(non_blank(&filter.coach_email))
        .bind(non_blank(&filter.dojo_name))
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        let _timer = timer("audit_chain");
        let rows = sqlx::query_as::<_, AuditLogEntry>(&format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs ORDER BY seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn list_config(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        let _timer = timer("list_config");
        let rows = sqlx::query_as::<_, ConfigEntry>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM config ORDER BY key"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn find_config(&self, key: &str) -> Result<Option<ConfigEntry>, StoreError> {
        let _timer = timer("find_config");
        let row = sqlx::query_as::<_, ConfigEntry>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM config WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

/// An open PostgreSQL transaction. Rolled back by sqlx if dropped uncommitted.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_allowed_email_by_id(
        &mut self,
        id: Uuid,
    ) -> Result<Option<AllowedEmail>, StoreError> {
        let _timer = timer("tx_find_allowed_email");
        let row = sqlx::query_as::<_, AllowedEmail>(&format!(
            "SELECT {ALLOWED_EMAIL_COLUMNS} FROM allowed_emails WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, entry), fields(email = %entry.email))]
    async fn insert_allowed_email(&mut self, entry: &AllowedEmail) -> Result<(), StoreError> {
        let _timer = timer("insert_allowed_email");
        sqlx::query(
            r#"
            INSERT INTO allowed_emails (id, email, is_admin, added_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.email)
        .bind(entry.is_admin)
        .bind(entry.added_by)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(email = %entry.email))]
    async fn seed_allowed_email(&mut self, entry: &AllowedEmail) -> Result<bool, StoreError> {
        let _timer = timer("seed_allowed_email");
        let result = sqlx::query(
            r#"
            INSERT INTO allowed_emails (id, email, is_admin, added_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.email)
        .bind(entry.is_admin)
        .bind(entry.added_by)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn set_allowed_email_admin(
        &mut self,
        id: Uuid,
        is_admin: bool,
    ) -> Result<Option<AllowedEmail>, StoreError> {
        let _timer = timer("set_allowed_email_admin");
        let row = sqlx::query_as::<_, AllowedEmail>(&format!(
            "UPDATE allowed_emails SET is_admin = $2 WHERE id = $1 RETURNING {ALLOWED_EMAIL_COLUMNS}"
        ))
        .bind(id)
        .bind(is_admin)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_allowed_email(&mut self, id: Uuid) -> Result<Option<AllowedEmail>, StoreError> {
        let _timer = timer("delete_allowed_email");
        let row = sqlx::query_as::<_, AllowedEmail>(&format!(
            "DELETE FROM allowed_emails WHERE id = $1 RETURNING {ALLOWED_EMAIL_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn count_admins(&mut self) -> Result<i64, StoreError> {
        let _timer = timer("count_admins");
        // Lock the admin rows so concurrent demotions cannot both pass the check.
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (SELECT id FROM allowed_emails WHERE is_admin FOR UPDATE) admins",
        )
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn find_dojo(&mut self, id: Uuid) -> Result<Option<Dojo>, StoreError> {
        let _timer = timer("tx_find_dojo");
        let row = sqlx::query_as::<_, Dojo>(&format!(
            "SELECT {DOJO_COLUMNS} FROM dojos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, dojo), fields(dojo_name = %dojo.name))]
    async fn insert_dojo(&mut self, dojo: &Dojo) -> Result<(), StoreError> {
        let _timer = timer("insert_dojo");
        sqlx::query("INSERT INTO dojos (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(dojo.id)
            .bind(&dojo.name)
            .bind(dojo.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_dojo(&mut self, id: Uuid, name: &str) -> Result<Option<Dojo>, StoreError> {
        let _timer = timer("rename_dojo");
        let row = sqlx::query_as::<_, Dojo>(&format!(
            "UPDATE dojos SET name = $2 WHERE id = $1 RETURNING {DOJO_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn delete_dojo(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let _timer = timer("delete_dojo");
        let result = sqlx::query("DELETE FROM dojos WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_coach(&mut self, id: Uuid) -> Result<Option<Coach>, StoreError> {
        let _timer = timer("tx_find_coach");
        let row = sqlx::query_as::<_, Coach>(&format!(
            "SELECT {COACH_COLUMNS} FROM coaches WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, coach), fields(coach_id = %coach.id))]
    async fn insert_coach(&mut self, coach: &Coach) -> Result<(), StoreError> {
        let _timer = timer("insert_coach");
        sqlx::query(
            r#"
            INSERT INTO coaches (id, email, full_name, phone, dojo_id, is_admin, onboarding_complete, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(coach.id)
        .bind(&coach.email)
        .bind(&coach.full_name)
        .bind(&coach.phone)
        .bind(coach.dojo_id)
        .bind(coach.is_admin)
        .bind(coach.onboarding_complete)
        .bind(coach.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, coach), fields(coach_id = %coach.id))]
    async fn update_coach(&mut self, coach: &Coach) -> Result<(), StoreError> {
        let _timer = timer("update_coach");
        sqlx::query(
            r#"
            UPDATE coaches
            SET full_name = $2, phone = $3, dojo_id = $4, is_admin = $5, onboarding_complete = $6
            WHERE id = $1
            "#,
        )
        .bind(coach.id)
        .bind(&coach.full_name)
        .bind(&coach.phone)
        .bind(coach.dojo_id)
        .bind(coach.is_admin)
        .bind(coach.onboarding_complete)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_athlete(&mut self, id: Uuid) -> Result<Option<Athlete>, StoreError> {
        let _timer = timer("tx_find_athlete");
        let row = sqlx::query_as::<_, Athlete>(&format!(
            "SELECT {ATHLETE_COLUMNS} FROM athletes WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    #[instrument(skip(self, athlete), fields(athlete_id = %athlete.id, dojo_id = %athlete.dojo_id))]
    async fn insert_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError> {
        let _timer = timer("insert_athlete");
        sqlx::query(
            r#"
            INSERT INTO athletes (id, coach_id, dojo_id, full_name, date_of_birth, gender, belt_rank,
                                  weight_kg, competition_day, kata_event, kumite_event, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(athlete.id)
        .bind(athlete.coach_id)
        .bind(athlete.dojo_id)
        .bind(&athlete.full_name)
        .bind(athlete.date_of_birth)
        .bind(athlete.gender.as_str())
        .bind(athlete.belt_rank.as_str())
        .bind(athlete.weight_kg)
        .bind(athlete.competition_day.as_str())
        .bind(athlete.kata_event)
        .bind(athlete.kumite_event)
        .bind(athlete.created_at)
        .bind(athlete.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, athlete), fields(athlete_id = %athlete.id))]
    async fn update_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError> {
        let _timer = timer("update_athlete");
        sqlx::query(
            r#"
            UPDATE athletes
            SET full_name = $2, date_of_birth = $3, gender = $4, belt_rank = $5, weight_kg = $6,
                competition_day = $7, kata_event = $8, kumite_event = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(athlete.id)
        .bind(&athlete.full_name)
        .bind(athlete.date_of_birth)
        .bind(athlete.gender.as_str())
        .bind(athlete.belt_rank.as_str())
        .bind(athlete.weight_kg)
        .bind(athlete.competition_day.as_str())
        .bind(athlete.kata_event)
        .bind(athlete.kumite_event)
        .bind(athlete.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_athlete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let _timer = timer("delete_athlete");
        let result = sqlx::query("DELETE FROM athletes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn last_audit_hash(&mut self) -> Result<Option<String>, StoreError> {
        let _timer = timer("last_audit_hash");
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(AUDIT_CHAIN_LOCK)
            .execute(&mut *self.tx)
            .await?;
        let hash: Option<String> =
            sqlx::query_scalar("SELECT entry_hash FROM audit_logs ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(hash)
    }

    #[instrument(skip(self, entry), fields(action = %entry.action, audit_id = %entry.id))]
    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<i64, StoreError> {
        let _timer = timer("append_audit");
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_logs (id, action, athlete_snapshot, coach_id, coach_email, dojo_name,
                                    prev_hash, entry_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING seq
            "#,
        )
        .bind(entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.athlete_snapshot)
        .bind(entry.coach_id)
        .bind(&entry.coach_email)
        .bind(&entry.dojo_name)
        .bind(&entry.prev_hash)
        .bind(&entry.entry_hash)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(seq)
    }

    #[instrument(skip(self, entry), fields(key = %entry.key))]
    async fn seed_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError> {
        let _timer = timer("seed_config");
        let result = sqlx::query(
            r#"
            INSERT INTO config (key, value, updated_at, updated_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.updated_at)
        .bind(entry.updated_by)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, entry), fields(key = %entry.key))]
    async fn update_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError> {
        let _timer = timer("update_config");
        let result = sqlx::query(
            r#"
            UPDATE config
            SET value = $2, updated_at = $3, updated_by = $4
            WHERE key = $1
            "#,
        )
        .bind(&entry.key)
        .bind(&entry.value)
        .bind(entry.updated_at)
        .bind(entry.updated_by)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
