use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order::{
    ActiveModel as OrderActiveModel, Column, Entity as Order, FulfillmentStatus,
    Model as OrderModel, PaymentStatus,
};
use crate::entities::{commission, order_item, order_note};
use crate::errors::ServiceError;
use crate::gateway::GatewayReference;

use super::{BaseRepository, Repository};

/// Optional filters for staff order listings
#[derive(Debug, Clone, Default)]
pub struct OrderListFilter {
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
}

/// Result of a staff status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffUpdateOutcome {
    Applied,
    /// Payment was no longer `paid`; nothing was written
    PaymentChanged,
    /// Fulfillment was no longer the expected state; nothing was written
    FulfillmentChanged,
}

/// Repository for order operations.
///
/// Every state change is a single conditional `UPDATE` whose `WHERE` clause
/// names the expected current state. Callers get back whether a row matched
/// and decide what a lost race means.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find an order scoped to its store
    pub async fn find_in_store(
        &self,
        store_id: Uuid,
        order_id: Uuid,
    ) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(order_id)
            .filter(Column::StoreId.eq(store_id))
            .one(self.base.get_db())
            .await?)
    }

    pub async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        Ok(Order::find_by_id(order_id).one(self.base.get_db()).await?)
    }

    pub async fn find_by_gateway_reference(
        &self,
        reference: &GatewayReference,
    ) -> Result<Option<OrderModel>, ServiceError> {
        let condition = match reference {
            GatewayReference::Order(id) => Column::GatewayOrderId.eq(id.as_str()),
            GatewayReference::Subscription(id) => Column::GatewaySubscriptionId.eq(id.as_str()),
        };
        Ok(Order::find()
            .filter(condition)
            .one(self.base.get_db())
            .await?)
    }

    pub async fn order_number_exists(
        &self,
        store_id: Uuid,
        order_number: &str,
    ) -> Result<bool, ServiceError> {
        let count = Order::find()
            .filter(Column::StoreId.eq(store_id))
            .filter(Column::OrderNumber.eq(order_number))
            .count(self.base.get_db())
            .await?;
        Ok(count > 0)
    }

    /// Items in cart order
    pub async fn items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(self.base.get_db())
            .await?)
    }

    /// Notes, oldest first
    pub async fn notes(&self, order_id: Uuid) -> Result<Vec<order_note::Model>, ServiceError> {
        Ok(order_note::Entity::find()
            .filter(order_note::Column::OrderId.eq(order_id))
            .order_by_asc(order_note::Column::AddedAt)
            .all(self.base.get_db())
            .await?)
    }

    /// Inserts the order, its items and an optional commission atomically.
    /// Nothing is persisted unless every insert succeeds.
    pub async fn insert_with_items(
        &self,
        order: OrderActiveModel,
        items: Vec<order_item::ActiveModel>,
        commission: Option<commission::ActiveModel>,
    ) -> Result<OrderModel, sea_orm::DbErr> {
        let txn = self.base.get_db().begin().await?;

        let saved = order.insert(&txn).await?;
        for item in items {
            item.insert(&txn).await?;
        }
        if let Some(commission) = commission {
            commission.insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(saved)
    }

    /// Stores the gateway handle unless the order already has one
    pub async fn set_gateway_reference_if_absent(
        &self,
        order_id: Uuid,
        reference: &GatewayReference,
    ) -> Result<bool, ServiceError> {
        let mut update = OrderActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        match reference {
            GatewayReference::Order(id) => update.gateway_order_id = Set(Some(id.clone())),
            GatewayReference::Subscription(id) => {
                update.gateway_subscription_id = Set(Some(id.clone()))
            }
        }

        let result = Order::update_many()
            .set(update)
            .filter(Column::Id.eq(order_id))
            .filter(Column::PaymentStatus.eq(PaymentStatus::Pending))
            .filter(Column::GatewayOrderId.is_null())
            .filter(Column::GatewaySubscriptionId.is_null())
            .exec(self.base.get_db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// `pending -> paid`, recording the provider payment id
    pub async fn mark_paid_if_pending(
        &self,
        order_id: Uuid,
        gateway_payment_id: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut update = OrderActiveModel {
            payment_status: Set(PaymentStatus::Paid),
            paid_at: Set(Some(paid_at)),
            updated_at: Set(paid_at),
            ..Default::default()
        };
        if gateway_payment_id.is_some() {
            update.gateway_payment_id = Set(gateway_payment_id);
        }
        transition_payment(self.base.get_db(), order_id, PaymentStatus::Pending, update).await
    }

    /// `pending -> failed`
    pub async fn mark_failed_if_pending(&self, order_id: Uuid) -> Result<bool, ServiceError> {
        let update = OrderActiveModel {
            payment_status: Set(PaymentStatus::Failed),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        transition_payment(self.base.get_db(), order_id, PaymentStatus::Pending, update).await
    }

    /// Applies a staff refund and/or fulfillment move in one transaction.
    /// Either both conditional updates match or neither is kept.
    pub async fn apply_staff_update(
        &self,
        order_id: Uuid,
        refund: bool,
        fulfillment: Option<(FulfillmentStatus, FulfillmentStatus)>,
    ) -> Result<StaffUpdateOutcome, ServiceError> {
        let txn = self.base.get_db().begin().await?;

        if refund {
            let update = OrderActiveModel {
                payment_status: Set(PaymentStatus::Refunded),
                updated_at: Set(Utc::now()),
                ..Default::default()
            };
            if !transition_payment(&txn, order_id, PaymentStatus::Paid, update).await? {
                txn.rollback().await?;
                return Ok(StaffUpdateOutcome::PaymentChanged);
            }
        }

        if let Some((expected, next)) = fulfillment {
            if !set_fulfillment_if(&txn, order_id, expected, next).await? {
                txn.rollback().await?;
                return Ok(StaffUpdateOutcome::FulfillmentChanged);
            }
        }

        txn.commit().await?;
        Ok(StaffUpdateOutcome::Applied)
    }

    /// Appends a note. Notes are never updated or removed.
    pub async fn add_note(
        &self,
        order_id: Uuid,
        text: String,
        added_by: String,
    ) -> Result<order_note::Model, ServiceError> {
        let note = order_note::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            text: Set(text),
            added_by: Set(added_by),
            added_at: Set(Utc::now()),
        };
        Ok(note.insert(self.base.get_db()).await?)
    }

    /// Newest-first page of a store's orders. `page` starts at 1.
    pub async fn list_for_store(
        &self,
        store_id: Uuid,
        filter: &OrderListFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find().filter(Column::StoreId.eq(store_id));
        if let Some(status) = filter.payment_status {
            query = query.filter(Column::PaymentStatus.eq(status));
        }
        if let Some(status) = filter.fulfillment_status {
            query = query.filter(Column::FulfillmentStatus.eq(status));
        }

        let paginator = query
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .paginate(self.base.get_db(), per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }
}

async fn transition_payment<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    expected: PaymentStatus,
    update: OrderActiveModel,
) -> Result<bool, ServiceError> {
    let result = Order::update_many()
        .set(update)
        .filter(Column::Id.eq(order_id))
        .filter(Column::PaymentStatus.eq(expected))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Moves fulfillment to `next` only if it is still `expected`
async fn set_fulfillment_if<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    expected: FulfillmentStatus,
    next: FulfillmentStatus,
) -> Result<bool, ServiceError> {
    let update = OrderActiveModel {
        fulfillment_status: Set(next),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    let result = Order::update_many()
        .set(update)
        .filter(Column::Id.eq(order_id))
        .filter(Column::FulfillmentStatus.eq(expected))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}
