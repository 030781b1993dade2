//! Postgres-backed membership store.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `40001` | `Concurrency` | Serialization failure between concurrent deletions |
//! | `40P01` | `Concurrency` | Deadlock detected |
//! | `23505` | `Concurrency` | Concurrent insert of the same member |
//! | `23503` | `Backend` | Referential integrity violation |
//! | Any other | `Backend` | Other database errors |
//!
//! Plan application runs in one `SERIALIZABLE` transaction that locks the
//! target unit row and every attached member row (`SELECT ... FOR UPDATE`)
//! before re-validating the plan.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, instrument};
use uuid::Uuid;

use memberhub_core::{AggregateRoot, DistrictId, ExpectedVersion, MemberId, ProvinceId, UnitId};
use memberhub_events::EventEnvelope;
use memberhub_membership::{
    BoardDecision, DeletionPlan, Member, MemberEvent, MemberRecord, MemberSnapshot, MemberStatus,
    RegistrationNumber,
};
use memberhub_organization::{District, HierarchyError, OrgUnit, Province, UnitGraph, UnitKind};

use super::r#trait::{MembershipStore, StoreError, reassign_members};

/// Embedded schema migrations (`crates/infra/migrations`).
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres-backed membership store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; clones share it.
#[derive(Debug, Clone)]
pub struct PostgresMembershipStore {
    pool: Arc<PgPool>,
}

impl PostgresMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Run pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    #[instrument(skip(self), fields(units = tracing::field::Empty), err)]
    pub async fn fetch_hierarchy(&self) -> Result<UnitGraph, StoreError> {
        let mut graph = UnitGraph::new();

        let provinces = sqlx::query("SELECT province_id, name FROM provinces ORDER BY province_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_provinces", e))?;
        for row in provinces {
            graph.insert_province(Province {
                id: ProvinceId::from_uuid(get(&row, "province_id")?),
                name: get(&row, "name")?,
            });
        }

        let districts =
            sqlx::query("SELECT district_id, province_id, name FROM districts ORDER BY district_id")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_districts", e))?;
        for row in districts {
            graph.insert_district(District {
                id: DistrictId::from_uuid(get(&row, "district_id")?),
                province_id: ProvinceId::from_uuid(get(&row, "province_id")?),
                name: get(&row, "name")?,
            })?;
        }

        let units = sqlx::query(
            "SELECT unit_id, kind, name, province_id, district_id FROM units ORDER BY unit_id",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_units", e))?;
        for row in units {
            graph.insert_unit(unit_from_row(&row)?)?;
        }

        Span::current().record("units", graph.len());
        Ok(graph)
    }

    /// Persist a unit row (administrative seeding).
    ///
    /// Rejects a unit whose district lies in another province, so every row
    /// written here loads back through [`Self::fetch_hierarchy`].
    #[instrument(skip(self, unit), fields(unit_id = %unit.id), err)]
    pub async fn insert_unit(&self, unit: &OrgUnit) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        if let Some(district) = unit.district_id {
            let owner: Option<Uuid> =
                sqlx::query_scalar("SELECT province_id FROM districts WHERE district_id = $1 FOR SHARE")
                    .bind(district.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("lock_district", e))?;
            let owner = owner
                .map(ProvinceId::from_uuid)
                .ok_or(HierarchyError::UnknownDistrict(district))?;
            if let Some(province) = unit.province_id {
                if province != owner {
                    return Err(HierarchyError::InconsistentContainment { district, province }.into());
                }
            }
        }

        sqlx::query(
            r#"
            INSERT INTO units (unit_id, kind, name, province_id, district_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(unit.id.as_uuid())
        .bind(unit.kind.as_str())
        .bind(&unit.name)
        .bind(unit.province_id.map(|p| *p.as_uuid()))
        .bind(unit.district_id.map(|d| *d.as_uuid()))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_unit", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    pub async fn insert_province(&self, province: &Province) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO provinces (province_id, name) VALUES ($1, $2)")
            .bind(province.id.as_uuid())
            .bind(&province.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_province", e))?;
        Ok(())
    }

    pub async fn insert_district(&self, district: &District) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO districts (district_id, province_id, name) VALUES ($1, $2, $3)")
            .bind(district.id.as_uuid())
            .bind(district.province_id.as_uuid())
            .bind(&district.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_district", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(unit_id = %unit_id), err)]
    pub async fn fetch_members_of_unit(&self, unit_id: UnitId) -> Result<Vec<MemberSnapshot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT member_id, unit_id, status, is_active, version
            FROM members
            WHERE unit_id = $1
            ORDER BY member_id ASC
            "#,
        )
        .bind(unit_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("members_of_unit", e))?;

        rows.iter().map(snapshot_from_row).collect()
    }

    #[instrument(skip(self), fields(member_id = %member_id), err)]
    pub async fn fetch_member(&self, member_id: MemberId) -> Result<Option<Member>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = $1"))
            .bind(member_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_member", e))?;

        row.as_ref()
            .map(|r| record_from_row(r).map(Member::from_record))
            .transpose()
    }

    /// Upsert a member row under an optimistic version check and journal its events.
    #[instrument(
        skip(self, member, events),
        fields(member_id = %member.id_typed(), expected_version = ?expected_version),
        err
    )]
    pub async fn store_member(
        &self,
        member: &Member,
        expected_version: ExpectedVersion,
        events: Vec<EventEnvelope<MemberEvent>>,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT version FROM members WHERE member_id = $1 FOR UPDATE")
                .bind(member.id_typed().as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_member", e))?;
        let current = current.unwrap_or(0) as u64;

        if !expected_version.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "member {}: expected {expected_version:?}, found {current}",
                member.id_typed()
            )));
        }

        upsert_member(&mut tx, &member.to_record()).await?;
        insert_events(&mut tx, &events).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    /// Apply a deletion plan atomically.
    #[instrument(
        skip(self, plan),
        fields(target_unit = %plan.target_unit(), members = plan.len(), %correlation_id),
        err
    )]
    pub async fn apply_plan(
        &self,
        plan: &DeletionPlan,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let target = sqlx::query("SELECT unit_id FROM units WHERE unit_id = $1 FOR UPDATE")
            .bind(plan.target_unit().as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_target_unit", e))?;
        if target.is_none() {
            return Err(StoreError::Concurrency(format!(
                "unit {} was deleted concurrently",
                plan.target_unit()
            )));
        }

        if let Some(destination) = plan.destination() {
            let exists = sqlx::query("SELECT unit_id FROM units WHERE unit_id = $1 FOR SHARE")
                .bind(destination.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_destination_unit", e))?;
            if exists.is_none() {
                return Err(StoreError::Concurrency(format!(
                    "destination unit {destination} no longer exists"
                )));
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE unit_id = $1 ORDER BY member_id FOR UPDATE"
        ))
        .bind(plan.target_unit().as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_members", e))?;

        let mut current = std::collections::BTreeMap::new();
        for row in &rows {
            let member = Member::from_record(record_from_row(row)?);
            current.insert(member.id_typed(), member);
        }
        let snapshots: Vec<MemberSnapshot> = current.values().map(Member::snapshot).collect();
        plan.revalidate(&snapshots)?;

        let updated = reassign_members(
            plan,
            |id| {
                current
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("member {id}")))
            },
            correlation_id,
            occurred_at,
        )?;

        for (member, _) in &updated {
            let record = member.to_record();
            let result = sqlx::query(
                r#"
                UPDATE members
                SET unit_id = $2, status = $3, is_active = $4, version = $5, updated_at = NOW()
                WHERE member_id = $1 AND version = $6
                "#,
            )
            .bind(record.member_id.as_uuid())
            .bind(record.unit_id.map(|u| *u.as_uuid()))
            .bind(record.status.as_str())
            .bind(record.is_active)
            .bind(record.version as i64)
            .bind(member.version() as i64 - 1)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_member", e))?;

            if result.rows_affected() != 1 {
                return Err(StoreError::Concurrency(format!(
                    "member {} changed during plan application",
                    record.member_id
                )));
            }
        }

        let envelopes: Vec<EventEnvelope<MemberEvent>> =
            updated.into_iter().map(|(_, envelope)| envelope).collect();
        insert_events(&mut tx, &envelopes).await?;

        sqlx::query("DELETE FROM units WHERE unit_id = $1")
            .bind(plan.target_unit().as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_unit", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!("deletion plan applied");
        Ok(envelopes)
    }
}

const MEMBER_COLUMNS: &str = "member_id, unit_id, full_name, status, is_active, registration_number, \
     board_decision_number, board_decided_on, rejection_reason, version";

async fn upsert_member(tx: &mut Transaction<'_, Postgres>, record: &MemberRecord) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO members (
            member_id,
            unit_id,
            full_name,
            status,
            is_active,
            registration_number,
            board_decision_number,
            board_decided_on,
            rejection_reason,
            version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (member_id)
        DO UPDATE SET
            unit_id = EXCLUDED.unit_id,
            full_name = EXCLUDED.full_name,
            status = EXCLUDED.status,
            is_active = EXCLUDED.is_active,
            registration_number = EXCLUDED.registration_number,
            board_decision_number = EXCLUDED.board_decision_number,
            board_decided_on = EXCLUDED.board_decided_on,
            rejection_reason = EXCLUDED.rejection_reason,
            version = EXCLUDED.version,
            updated_at = NOW()
        "#,
    )
    .bind(record.member_id.as_uuid())
    .bind(record.unit_id.map(|u| *u.as_uuid()))
    .bind(&record.full_name)
    .bind(record.status.as_str())
    .bind(record.is_active)
    .bind(record.registration_number.as_ref().map(|r| r.as_str().to_string()))
    .bind(record.board_decision.as_ref().map(|b| b.decision_number.clone()))
    .bind(record.board_decision.as_ref().map(|b| b.decided_on))
    .bind(&record.rejection_reason)
    .bind(record.version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_member", e))?;
    Ok(())
}

async fn insert_events(
    tx: &mut Transaction<'_, Postgres>,
    events: &[EventEnvelope<MemberEvent>],
) -> Result<(), StoreError> {
    for envelope in events {
        let stored = envelope
            .to_json_payload()
            .map_err(|e| StoreError::Backend(format!("payload serialization failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO member_events (
                event_id,
                correlation_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                occurred_at,
                payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.event_id())
        .bind(stored.correlation_id())
        .bind(stored.aggregate_id())
        .bind(stored.aggregate_type())
        .bind(stored.sequence_number() as i64)
        .bind(stored.event_type())
        .bind(stored.occurred_at())
        .bind(stored.payload())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_event", e))?;
    }
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

fn unit_from_row(row: &PgRow) -> Result<OrgUnit, StoreError> {
    let kind: String = get(row, "kind")?;
    let kind: UnitKind = kind
        .parse()
        .map_err(|e| StoreError::Backend(format!("bad unit kind: {e}")))?;
    let province: Option<Uuid> = get(row, "province_id")?;
    let district: Option<Uuid> = get(row, "district_id")?;

    Ok(OrgUnit {
        id: UnitId::from_uuid(get(row, "unit_id")?),
        kind,
        name: get(row, "name")?,
        province_id: province.map(ProvinceId::from_uuid),
        district_id: district.map(DistrictId::from_uuid),
    })
}

fn parse_status(row: &PgRow) -> Result<MemberStatus, StoreError> {
    let status: String = get(row, "status")?;
    status
        .parse()
        .map_err(|e| StoreError::Backend(format!("bad member status: {e}")))
}

fn snapshot_from_row(row: &PgRow) -> Result<MemberSnapshot, StoreError> {
    let unit: Option<Uuid> = get(row, "unit_id")?;
    let version: i64 = get(row, "version")?;
    Ok(MemberSnapshot {
        member_id: MemberId::from_uuid(get(row, "member_id")?),
        unit_id: unit.map(UnitId::from_uuid),
        status: parse_status(row)?,
        is_active: get(row, "is_active")?,
        version: version as u64,
    })
}

fn record_from_row(row: &PgRow) -> Result<MemberRecord, StoreError> {
    let unit: Option<Uuid> = get(row, "unit_id")?;
    let version: i64 = get(row, "version")?;
    let registration: Option<String> = get(row, "registration_number")?;
    let decision_number: Option<String> = get(row, "board_decision_number")?;
    let decided_on: Option<NaiveDate> = get(row, "board_decided_on")?;

    let registration_number = registration
        .map(RegistrationNumber::new)
        .transpose()
        .map_err(|e| StoreError::Backend(format!("bad registration number: {e}")))?;
    let board_decision = match (decision_number, decided_on) {
        (Some(number), Some(date)) => Some(BoardDecision::new(number, date)),
        _ => None,
    };

    Ok(MemberRecord {
        member_id: MemberId::from_uuid(get(row, "member_id")?),
        unit_id: unit.map(UnitId::from_uuid),
        full_name: get(row, "full_name")?,
        status: parse_status(row)?,
        is_active: get(row, "is_active")?,
        registration_number,
        board_decision,
        rejection_reason: get(row, "rejection_reason")?,
        version: version as u64,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn runtime() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresMembershipStore requires a tokio runtime; call it from within one".to_string(),
        )
    })
}

// The store trait is synchronous; block on the async methods through the
// current runtime handle.
impl MembershipStore for PostgresMembershipStore {
    fn load_hierarchy(&self) -> Result<UnitGraph, StoreError> {
        runtime()?.block_on(self.fetch_hierarchy())
    }

    fn members_of_unit(&self, unit_id: UnitId) -> Result<Vec<MemberSnapshot>, StoreError> {
        runtime()?.block_on(self.fetch_members_of_unit(unit_id))
    }

    fn load_member(&self, member_id: MemberId) -> Result<Option<Member>, StoreError> {
        runtime()?.block_on(self.fetch_member(member_id))
    }

    fn save_member(
        &self,
        member: &Member,
        expected_version: ExpectedVersion,
        events: Vec<EventEnvelope<MemberEvent>>,
    ) -> Result<(), StoreError> {
        runtime()?.block_on(self.store_member(member, expected_version, events))
    }

    fn apply_deletion_plan(
        &self,
        plan: &DeletionPlan,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<EventEnvelope<MemberEvent>>, StoreError> {
        runtime()?.block_on(self.apply_plan(plan, correlation_id, occurred_at))
    }
}
