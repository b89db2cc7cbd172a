//! `users` and `groups` as seen by billing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::billing::{BillingAccount, OwnedGroup};
use crate::domain::foundation::{DomainError, GroupId, UserId};
use crate::ports::AccountRepository;

use super::store::{db_error, parse_plan, parse_status, timestamp, PostgresBillingStore};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    plan: String,
    subscription_status: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for BillingAccount {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(BillingAccount {
            id: UserId::from_uuid(row.id),
            email: row.email,
            plan: parse_plan(&row.plan)?,
            subscription_status: parse_status(row.subscription_status),
            deleted_at: timestamp(row.deleted_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    max_members: i32,
    active_member_count: i64,
}

impl From<GroupRow> for OwnedGroup {
    fn from(row: GroupRow) -> Self {
        OwnedGroup {
            id: GroupId::from_uuid(row.id),
            owner_id: UserId::from_uuid(row.owner_id),
            name: row.name,
            max_members: u32::try_from(row.max_members).unwrap_or(0),
            active_member_count: u32::try_from(row.active_member_count).unwrap_or(u32::MAX),
        }
    }
}

#[async_trait]
impl AccountRepository for PostgresBillingStore {
    async fn find_by_id(&self, user_id: &UserId) -> Result<Option<BillingAccount>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, plan, subscription_status, deleted_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load user"))?;

        row.map(BillingAccount::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<BillingAccount>, DomainError> {
        // Live accounts win over soft-deleted ones sharing the address.
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, plan, subscription_status, deleted_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            ORDER BY deleted_at IS NOT NULL, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load user by email"))?;

        row.map(BillingAccount::try_from).transpose()
    }

    async fn owned_groups(&self, owner_id: &UserId) -> Result<Vec<OwnedGroup>, DomainError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT g.id, g.owner_id, g.name, g.max_members,
                   COUNT(m.user_id) FILTER (WHERE m.status = 'active') AS active_member_count
            FROM groups g
            LEFT JOIN group_members m ON m.group_id = g.id
            WHERE g.owner_id = $1
            GROUP BY g.id
            ORDER BY g.name
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load owned groups"))?;

        Ok(rows.into_iter().map(OwnedGroup::from).collect())
    }
}
