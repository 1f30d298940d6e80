//! PostgreSQL implementation of LicenseStore.
//!
//! Every license ever granted is a row in `licenses`; the user's current one
//! carries `is_current = true` (enforced unique per user by a partial index).
//! A commit runs in one transaction:
//!
//! 1. insert the ledger entries (`ON CONFLICT DO NOTHING`; any miss → duplicate)
//! 2. lock the current row with `FOR UPDATE` and check the precondition
//! 3. update it in place, or retire it and insert the successor
//!
//! Any failed step rolls the whole unit back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{GatewayEventId, LicenseId, Timestamp, UserId};
use crate::domain::licensing::{License, LicenseStatus, NoticeThreshold, Plan};
use crate::ports::{
    CommitOutcome, LicenseChange, LicenseStore, LicenseWrite, Precondition, ProcessedEvent,
    StoreError,
};

const LICENSE_COLUMNS: &str = "id, user_id, plan, status, starts_at, expires_at, \
     source_correlation, charges_applied, version, created_at, updated_at";

/// PostgreSQL implementation of the LicenseStore port.
pub struct PostgresLicenseStore {
    pool: PgPool,
}

impl PostgresLicenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a license.
#[derive(Debug, sqlx::FromRow)]
struct LicenseRow {
    id: Uuid,
    user_id: String,
    plan: String,
    status: String,
    starts_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    source_correlation: Option<String>,
    charges_applied: i32,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LicenseRow> for License {
    type Error = StoreError;

    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        let plan: Plan = row
            .plan
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("license {}: {}", row.id, e)))?;
        let status: LicenseStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("license {}: {}", row.id, e)))?;
        let user_id = UserId::new(row.user_id)
            .map_err(|e| StoreError::Corrupt(format!("license {}: {}", row.id, e)))?;
        let version = u64::try_from(row.version).map_err(|_| {
            StoreError::Corrupt(format!("license {}: negative version", row.id))
        })?;
        let charges_applied = u32::try_from(row.charges_applied).map_err(|_| {
            StoreError::Corrupt(format!("license {}: negative charge count", row.id))
        })?;

        let license = License {
            id: LicenseId::from_uuid(row.id),
            user_id,
            plan,
            status,
            starts_at: Timestamp::from_datetime(row.starts_at),
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            source_correlation: row.source_correlation,
            charges_applied,
            version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        };
        license
            .validate()
            .map_err(|e| StoreError::Corrupt(format!("license {}: {}", row.id, e)))?;
        Ok(license)
    }
}

fn db_error(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{}: {}", context, e))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Database(format!("version {} out of range", version)))
}

fn to_db_count(count: u32) -> Result<i32, StoreError> {
    i32::try_from(count)
        .map_err(|_| StoreError::Database(format!("charge count {} out of range", count)))
}

/// Outcome of one step inside the commit transaction.
enum Step {
    Continue,
    Abort(CommitOutcome),
}

impl PostgresLicenseStore {
    async fn insert_ledger_entry(
        tx: &mut Transaction<'_, Postgres>,
        entry: &ProcessedEvent,
    ) -> Result<Step, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, processed_at)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(entry.event_id.as_str())
        .bind(entry.processed_at.as_datetime())
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to record processed event"))?;

        if result.rows_affected() == 0 {
            Ok(Step::Abort(CommitOutcome::DuplicateEvent))
        } else {
            Ok(Step::Continue)
        }
    }

    async fn lock_current(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> Result<Option<(Uuid, i64)>, StoreError> {
        sqlx::query_as(
            r#"
            SELECT id, version
            FROM licenses
            WHERE user_id = $1 AND is_current
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("Failed to lock current license"))
    }

    async fn update_in_place(
        tx: &mut Transaction<'_, Postgres>,
        mut license: License,
        precondition: Precondition,
    ) -> Result<Result<License, CommitOutcome>, StoreError> {
        let Precondition::Current { license_id, version } = precondition else {
            return Err(StoreError::Database(
                "in-place update requires a current-license precondition".to_string(),
            ));
        };
        if license.id != license_id {
            return Err(StoreError::Database(format!(
                "update targets {} but current license is {}",
                license.id, license_id
            )));
        }
        license.version = version + 1;

        let result = sqlx::query(
            r#"
            UPDATE licenses SET
                status = $3,
                expires_at = $4,
                source_correlation = $5,
                charges_applied = $6,
                updated_at = $7,
                version = $8
            WHERE id = $1 AND version = $2 AND is_current
            "#,
        )
        .bind(license.id.as_uuid())
        .bind(to_db_version(version)?)
        .bind(license.status.as_str())
        .bind(license.expires_at.map(|t| *t.as_datetime()))
        .bind(&license.source_correlation)
        .bind(to_db_count(license.charges_applied)?)
        .bind(license.updated_at.as_datetime())
        .bind(to_db_version(license.version)?)
        .execute(&mut **tx)
        .await
        .map_err(db_error("Failed to update license"))?;

        if result.rows_affected() == 0 {
            return Ok(Err(CommitOutcome::VersionConflict));
        }
        Ok(Ok(license))
    }

    async fn supersede(
        tx: &mut Transaction<'_, Postgres>,
        mut license: License,
        current: Option<(Uuid, i64)>,
    ) -> Result<Result<License, CommitOutcome>, StoreError> {
        let next_version = match current {
            Some((previous_id, previous_version)) => {
                sqlx::query("UPDATE licenses SET is_current = FALSE WHERE id = $1")
                    .bind(previous_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(db_error("Failed to retire current license"))?;
                previous_version + 1
            }
            None => 0,
        };
        license.version = u64::try_from(next_version)
            .map_err(|_| StoreError::Corrupt("negative license version".to_string()))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO licenses (
                id, user_id, plan, status, starts_at, expires_at,
                source_correlation, charges_applied, version, is_current,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $11)
            "#,
        )
        .bind(license.id.as_uuid())
        .bind(license.user_id.as_str())
        .bind(license.plan.as_str())
        .bind(license.status.as_str())
        .bind(license.starts_at.as_datetime())
        .bind(license.expires_at.map(|t| *t.as_datetime()))
        .bind(&license.source_correlation)
        .bind(to_db_count(license.charges_applied)?)
        .bind(next_version)
        .bind(license.created_at.as_datetime())
        .bind(license.updated_at.as_datetime())
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => Ok(Ok(license)),
            // Another writer created the user's first license concurrently.
            Err(e) if is_unique_violation(&e) => Ok(Err(CommitOutcome::VersionConflict)),
            Err(e) => Err(db_error("Failed to insert license")(e)),
        }
    }
}

fn precondition_holds(precondition: Precondition, current: Option<(Uuid, i64)>) -> bool {
    match (precondition, current) {
        (Precondition::Any, _) => true,
        (Precondition::NoLicense, current) => current.is_none(),
        (Precondition::Current { license_id, version }, Some((id, current_version))) => {
            license_id.as_uuid() == &id && i64::try_from(version).ok() == Some(current_version)
        }
        (Precondition::Current { .. }, None) => false,
    }
}

#[async_trait]
impl LicenseStore for PostgresLicenseStore {
    async fn current_for_user(&self, user_id: &UserId) -> Result<Option<License>, StoreError> {
        let row: Option<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE user_id = $1 AND is_current",
            LICENSE_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to find current license"))?;

        row.map(License::try_from).transpose()
    }

    async fn history(&self, user_id: &UserId) -> Result<Vec<License>, StoreError> {
        let rows: Vec<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE user_id = $1 ORDER BY created_at DESC, version DESC",
            LICENSE_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load license history"))?;

        rows.into_iter().map(License::try_from).collect()
    }

    async fn is_processed(&self, event_id: &GatewayEventId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_events WHERE event_id = $1)",
        )
        .bind(event_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("Failed to check processed event"))?;

        Ok(exists)
    }

    async fn commit(&self, write: LicenseWrite) -> Result<CommitOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        for entry in &write.ledger_entries {
            if let Step::Abort(outcome) = Self::insert_ledger_entry(&mut tx, entry).await? {
                return Ok(outcome);
            }
        }

        let current = Self::lock_current(&mut tx, &write.user_id).await?;
        if !precondition_holds(write.precondition, current) {
            return Ok(CommitOutcome::VersionConflict);
        }

        let stored = match write.change {
            Some(LicenseChange::Update(license)) => {
                match Self::update_in_place(&mut tx, license, write.precondition).await? {
                    Ok(license) => Some(license),
                    Err(outcome) => return Ok(outcome),
                }
            }
            Some(LicenseChange::Supersede(license)) => {
                match Self::supersede(&mut tx, license, current).await? {
                    Ok(license) => Some(license),
                    Err(outcome) => return Ok(outcome),
                }
            }
            None => None,
        };

        tx.commit()
            .await
            .map_err(db_error("Failed to commit license write"))?;

        Ok(CommitOutcome::Applied(stored))
    }

    async fn list_sweepable(&self, horizon: Timestamp) -> Result<Vec<License>, StoreError> {
        let rows: Vec<LicenseRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM licenses
            WHERE is_current
              AND plan <> 'lifetime'
              AND status IN ('active', 'cancelled')
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
            LICENSE_COLUMNS
        ))
        .bind(horizon.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list sweepable licenses"))?;

        rows.into_iter().map(License::try_from).collect()
    }

    async fn record_notice(
        &self,
        license_id: &LicenseId,
        threshold: NoticeThreshold,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let threshold_days = i32::try_from(threshold.days())
            .map_err(|_| StoreError::Database(format!("threshold {} out of range", threshold)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO license_notices (license_id, threshold_days, sent_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (license_id, threshold_days) DO NOTHING
            "#,
        )
        .bind(license_id.as_uuid())
        .bind(threshold_days)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to record notice"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn prune_ledger(&self, before: Timestamp) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < $1")
            .bind(before.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to prune processed events"))?;

        Ok(result.rows_affected())
    }
}
