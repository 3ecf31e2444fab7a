//! PostgreSQL routing store.

use super::{RoutingStore, RoutingTx};
use crate::errors::StoreError;
use crate::types::{
    Application, BehaviorGroup, BehaviorGroupAction, Bundle, Endpoint, EndpointEventType,
    EventType,
};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS bundles (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS applications (
        id UUID PRIMARY KEY,
        bundle_id UUID NOT NULL REFERENCES bundles(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        UNIQUE (bundle_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS event_types (
        id UUID PRIMARY KEY,
        application_id UUID NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        display_name TEXT NOT NULL,
        UNIQUE (application_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS endpoints (
        id UUID PRIMARY KEY,
        org_id TEXT NOT NULL,
        endpoint_type TEXT NOT NULL,
        name TEXT NOT NULL,
        properties JSONB NOT NULL DEFAULT '{}'::jsonb
    )",
    "CREATE INDEX IF NOT EXISTS idx_endpoints_org_id ON endpoints(org_id, id)",
    "CREATE TABLE IF NOT EXISTS behavior_groups (
        id UUID PRIMARY KEY,
        org_id TEXT NOT NULL,
        bundle_id UUID NOT NULL REFERENCES bundles(id) ON DELETE CASCADE,
        display_name TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_behavior_groups_org_bundle
        ON behavior_groups(org_id, bundle_id)",
    "CREATE TABLE IF NOT EXISTS behavior_group_actions (
        behavior_group_id UUID NOT NULL REFERENCES behavior_groups(id) ON DELETE CASCADE,
        endpoint_id UUID NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        PRIMARY KEY (behavior_group_id, endpoint_id),
        UNIQUE (behavior_group_id, position)
    )",
    "CREATE TABLE IF NOT EXISTS event_type_behaviors (
        behavior_group_id UUID NOT NULL REFERENCES behavior_groups(id) ON DELETE CASCADE,
        event_type_id UUID NOT NULL REFERENCES event_types(id) ON DELETE CASCADE,
        PRIMARY KEY (behavior_group_id, event_type_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_event_type_behaviors_event_type
        ON event_type_behaviors(event_type_id)",
    "CREATE TABLE IF NOT EXISTS endpoint_event_type (
        endpoint_id UUID NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
        event_type_id UUID NOT NULL REFERENCES event_types(id) ON DELETE CASCADE,
        PRIMARY KEY (endpoint_id, event_type_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_endpoint_event_type_event_type
        ON endpoint_event_type(event_type_id)",
];

pub struct PgRoutingStore {
    pool: PgPool,
}

impl PgRoutingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RoutingStore for PgRoutingStore {
    async fn begin(&self) -> Result<Box<dyn RoutingTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgRoutingTx { tx }))
    }
}

struct PgRoutingTx {
    tx: Transaction<'static, Postgres>,
}

fn behavior_group_from_row(row: &PgRow) -> BehaviorGroup {
    BehaviorGroup {
        id: row.get("id"),
        org_id: row.get("org_id"),
        bundle_id: row.get("bundle_id"),
        display_name: row.get("display_name"),
    }
}

fn endpoint_from_row(row: &PgRow) -> Endpoint {
    Endpoint {
        id: row.get("id"),
        org_id: row.get("org_id"),
        endpoint_type: row.get("endpoint_type"),
        name: row.get("name"),
        properties: row.get("properties"),
    }
}

fn pair_from_row(row: &PgRow) -> EndpointEventType {
    EndpointEventType::new(row.get("endpoint_id"), row.get("event_type_id"))
}

fn split_pairs(pairs: &[EndpointEventType]) -> (Vec<Uuid>, Vec<Uuid>) {
    pairs
        .iter()
        .map(|pair| (pair.endpoint_id, pair.event_type_id))
        .unzip()
}

#[async_trait]
impl RoutingTx for PgRoutingTx {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn insert_bundle(&mut self, bundle: &Bundle) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO bundles (id, name, display_name) VALUES ($1, $2, $3)")
            .bind(bundle.id)
            .bind(&bundle.name)
            .bind(&bundle.display_name)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_application(&mut self, application: &Application) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO applications (id, bundle_id, name, display_name) VALUES ($1, $2, $3, $4)",
        )
        .bind(application.id)
        .bind(application.bundle_id)
        .bind(&application.name)
        .bind(&application.display_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_event_type(&mut self, event_type: &EventType) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO event_types (id, application_id, name, display_name)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event_type.id)
        .bind(event_type.application_id)
        .bind(&event_type.name)
        .bind(&event_type.display_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_endpoint(&mut self, endpoint: &Endpoint) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO endpoints (id, org_id, endpoint_type, name, properties)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(endpoint.id)
        .bind(&endpoint.org_id)
        .bind(&endpoint.endpoint_type)
        .bind(&endpoint.name)
        .bind(&endpoint.properties)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_bundle(&mut self, id: Uuid) -> Result<Option<Bundle>, StoreError> {
        let row = sqlx::query("SELECT id, name, display_name FROM bundles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(|row| Bundle {
            id: row.get("id"),
            name: row.get("name"),
            display_name: row.get("display_name"),
        }))
    }

    async fn get_application(&mut self, id: Uuid) -> Result<Option<Application>, StoreError> {
        let row = sqlx::query(
            "SELECT id, bundle_id, name, display_name FROM applications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| Application {
            id: row.get("id"),
            bundle_id: row.get("bundle_id"),
            name: row.get("name"),
            display_name: row.get("display_name"),
        }))
    }

    async fn get_event_type(&mut self, id: Uuid) -> Result<Option<EventType>, StoreError> {
        let row = sqlx::query(
            "SELECT id, application_id, name, display_name FROM event_types WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|row| EventType {
            id: row.get("id"),
            application_id: row.get("application_id"),
            name: row.get("name"),
            display_name: row.get("display_name"),
        }))
    }

    async fn get_endpoint(&mut self, id: Uuid) -> Result<Option<Endpoint>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, endpoint_type, name, properties FROM endpoints WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(endpoint_from_row))
    }

    async fn list_endpoints(
        &mut self,
        org_id: Option<&str>,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Endpoint>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, org_id, endpoint_type, name, properties FROM endpoints
             WHERE ($1::TEXT IS NULL OR org_id = $1)
               AND ($2::UUID IS NULL OR id > $2)
             ORDER BY id
             LIMIT $3",
        )
        .bind(org_id)
        .bind(after)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(endpoint_from_row).collect())
    }

    async fn get_behavior_group(&mut self, id: Uuid) -> Result<Option<BehaviorGroup>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, bundle_id, display_name FROM behavior_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(behavior_group_from_row))
    }

    async fn find_behavior_group_by_name(
        &mut self,
        org_id: &str,
        bundle_id: Uuid,
        display_name: &str,
    ) -> Result<Option<BehaviorGroup>, StoreError> {
        let row = sqlx::query(
            "SELECT id, org_id, bundle_id, display_name FROM behavior_groups
             WHERE org_id = $1 AND bundle_id = $2 AND display_name = $3
             ORDER BY id
             LIMIT 1",
        )
        .bind(org_id)
        .bind(bundle_id)
        .bind(display_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(behavior_group_from_row))
    }

    async fn insert_behavior_group(&mut self, group: &BehaviorGroup) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO behavior_groups (id, org_id, bundle_id, display_name)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(group.id)
        .bind(&group.org_id)
        .bind(group.bundle_id)
        .bind(&group.display_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_behavior_group(&mut self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM behavior_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn behavior_group_actions(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<BehaviorGroupAction>, StoreError> {
        let rows = sqlx::query(
            "SELECT behavior_group_id, endpoint_id, position FROM behavior_group_actions
             WHERE behavior_group_id = $1
             ORDER BY position",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(|row| BehaviorGroupAction {
                behavior_group_id: row.get("behavior_group_id"),
                endpoint_id: row.get("endpoint_id"),
                position: row.get("position"),
            })
            .collect())
    }

    async fn replace_behavior_group_actions(
        &mut self,
        group_id: Uuid,
        endpoint_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM behavior_group_actions WHERE behavior_group_id = $1")
            .bind(group_id)
            .execute(&mut *self.tx)
            .await?;

        if endpoint_ids.is_empty() {
            return Ok(());
        }

        // WITH ORDINALITY numbers from 1
        sqlx::query(
            "INSERT INTO behavior_group_actions (behavior_group_id, endpoint_id, position)
             SELECT $1, endpoint_id, (ord - 1)::INTEGER
             FROM UNNEST($2::UUID[]) WITH ORDINALITY AS t(endpoint_id, ord)",
        )
        .bind(group_id)
        .bind(endpoint_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn behavior_group_event_types(
        &mut self,
        group_id: Uuid,
    ) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT event_type_id FROM event_type_behaviors WHERE behavior_group_id = $1
             ORDER BY event_type_id",
        )
        .bind(group_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(|row| row.get("event_type_id")).collect())
    }

    async fn insert_behavior(
        &mut self,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO event_type_behaviors (behavior_group_id, event_type_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(event_type_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_behavior(
        &mut self,
        group_id: Uuid,
        event_type_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM event_type_behaviors WHERE behavior_group_id = $1 AND event_type_id = $2",
        )
        .bind(group_id)
        .bind(event_type_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn behavior_groups_for_event_type(
        &mut self,
        org_id: &str,
        event_type_id: Uuid,
    ) -> Result<Vec<BehaviorGroup>, StoreError> {
        let rows = sqlx::query(
            "SELECT bg.id, bg.org_id, bg.bundle_id, bg.display_name
             FROM behavior_groups bg
             JOIN event_type_behaviors b ON b.behavior_group_id = bg.id
             WHERE bg.org_id = $1 AND b.event_type_id = $2
             ORDER BY bg.id",
        )
        .bind(org_id)
        .bind(event_type_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(behavior_group_from_row).collect())
    }

    async fn reachable_pairs(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT a.endpoint_id, b.event_type_id
             FROM event_type_behaviors b
             JOIN behavior_groups bg ON bg.id = b.behavior_group_id
             JOIN behavior_group_actions a ON a.behavior_group_id = bg.id
             WHERE bg.org_id = $1 AND b.event_type_id = ANY($2)",
        )
        .bind(org_id)
        .bind(event_type_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(pair_from_row).collect())
    }

    async fn endpoint_event_types(
        &mut self,
        org_id: &str,
        event_type_ids: &[Uuid],
    ) -> Result<HashSet<EndpointEventType>, StoreError> {
        let rows = sqlx::query(
            "SELECT eet.endpoint_id, eet.event_type_id
             FROM endpoint_event_type eet
             JOIN endpoints e ON e.id = eet.endpoint_id
             WHERE e.org_id = $1 AND eet.event_type_id = ANY($2)",
        )
        .bind(org_id)
        .bind(event_type_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(pair_from_row).collect())
    }

    async fn insert_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let (endpoint_ids, event_type_ids) = split_pairs(pairs);

        sqlx::query(
            "INSERT INTO endpoint_event_type (endpoint_id, event_type_id)
             SELECT * FROM UNNEST($1::UUID[], $2::UUID[])
             ON CONFLICT DO NOTHING",
        )
        .bind(&endpoint_ids)
        .bind(&event_type_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_endpoint_event_types(
        &mut self,
        pairs: &[EndpointEventType],
    ) -> Result<(), StoreError> {
        if pairs.is_empty() {
            return Ok(());
        }
        let (endpoint_ids, event_type_ids) = split_pairs(pairs);

        sqlx::query(
            "DELETE FROM endpoint_event_type eet
             USING UNNEST($1::UUID[], $2::UUID[]) AS t(endpoint_id, event_type_id)
             WHERE eet.endpoint_id = t.endpoint_id AND eet.event_type_id = t.event_type_id",
        )
        .bind(&endpoint_ids)
        .bind(&event_type_ids)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
