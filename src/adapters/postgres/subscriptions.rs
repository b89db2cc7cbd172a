//! `subscriptions` table plus the user cache and group ceilings that move
//! with it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::billing::{BillingStatus, Subscription};
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp, UserId};
use crate::ports::{SubscriptionRepository, SubscriptionTransition};

use super::store::{db_error, parse_plan, timestamp, PostgresBillingStore};

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: Uuid,
    stripe_subscription_id: String,
    stripe_customer_id: Option<String>,
    plan: String,
    status: String,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            stripe_subscription_id: row.stripe_subscription_id,
            stripe_customer_id: row.stripe_customer_id,
            plan: parse_plan(&row.plan)?,
            status: BillingStatus::from_provider(&row.status),
            current_period_end: timestamp(row.current_period_end),
            cancel_at_period_end: row.cancel_at_period_end,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const COLUMNS: &str = "id, user_id, stripe_subscription_id, stripe_customer_id, plan, status, \
                       current_period_end, cancel_at_period_end, created_at, updated_at";

impl PostgresBillingStore {
    async fn fetch_subscription(
        &self,
        filter: &str,
        bind: Uuid,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE {} ORDER BY updated_at DESC LIMIT 1",
            COLUMNS, filter
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load subscription"))?;

        row.map(Subscription::try_from).transpose()
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresBillingStore {
    async fn find_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let sql = format!(
            "SELECT {} FROM subscriptions WHERE stripe_subscription_id = $1",
            COLUMNS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(stripe_subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load subscription"))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_current_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        self.fetch_subscription(
            "user_id = $1 AND status IN ('active', 'trialing')",
            *user_id.as_uuid(),
        )
        .await
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, DomainError> {
        self.fetch_subscription("user_id = $1", *user_id.as_uuid()).await
    }

    async fn apply(&self, transition: SubscriptionTransition) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let sub = &transition.subscription;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, stripe_subscription_id, stripe_customer_id, plan, status,
                current_period_end, cancel_at_period_end, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (stripe_subscription_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(sub.id.as_uuid())
        .bind(sub.user_id.as_uuid())
        .bind(&sub.stripe_subscription_id)
        .bind(&sub.stripe_customer_id)
        .bind(sub.plan.as_str())
        .bind(sub.status.as_str())
        .bind(sub.current_period_end.map(|t| *t.as_datetime()))
        .bind(sub.cancel_at_period_end)
        .bind(sub.created_at.as_datetime())
        .bind(sub.updated_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to upsert subscription"))?;

        if let Some(update) = &transition.account {
            let result = sqlx::query(
                r#"
                UPDATE users
                SET plan = $2, subscription_status = $3, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(update.user_id.as_uuid())
            .bind(update.plan.as_str())
            .bind(update.status.as_ref().map(|s| s.as_str().to_string()))
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update user cache"))?;

            if result.rows_affected() == 0 {
                return Err(DomainError::new(
                    ErrorCode::UserNotFound,
                    format!("User {} not found", update.user_id),
                ));
            }
        }

        if let Some(update) = &transition.groups {
            sqlx::query(
                r#"
                UPDATE groups
                SET max_members = $2, updated_at = NOW()
                WHERE owner_id = $1
                "#,
            )
            .bind(update.owner_id.as_uuid())
            .bind(i32::try_from(update.max_members).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update group ceilings"))?;
        }

        tx.commit()
            .await
            .map_err(db_error("Failed to commit subscription transition"))?;

        Ok(())
    }
}
