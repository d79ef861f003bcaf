use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{affiliate, product, product_variant, store};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Read-only access to stores, products, variants and affiliates
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    base: BaseRepository,
}

impl CatalogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Active store by its public slug
    pub async fn find_active_store(&self, slug: &str) -> Result<Option<store::Model>, ServiceError> {
        Ok(store::Entity::find()
            .filter(store::Column::Slug.eq(slug))
            .filter(store::Column::Active.eq(true))
            .one(self.base.get_db())
            .await?)
    }

    /// Product owned by `store_id`; products of other stores are invisible
    pub async fn find_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        Ok(product::Entity::find_by_id(product_id)
            .filter(product::Column::StoreId.eq(store_id))
            .one(self.base.get_db())
            .await?)
    }

    /// Variant of a product matched by name
    pub async fn find_variant(
        &self,
        product_id: Uuid,
        name: &str,
    ) -> Result<Option<product_variant::Model>, ServiceError> {
        Ok(product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .filter(product_variant::Column::Name.eq(name))
            .one(self.base.get_db())
            .await?)
    }

    pub async fn find_active_affiliate(
        &self,
        store_id: Uuid,
        code: &str,
    ) -> Result<Option<affiliate::Model>, ServiceError> {
        Ok(affiliate::Entity::find()
            .filter(affiliate::Column::StoreId.eq(store_id))
            .filter(affiliate::Column::Code.eq(code))
            .filter(affiliate::Column::Active.eq(true))
            .one(self.base.get_db())
            .await?)
    }
}
