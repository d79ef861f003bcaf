use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;

use crate::entities::webhook_event;
use crate::errors::ServiceError;

use super::{is_unique_violation, BaseRepository, Repository};

#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    base: BaseRepository,
}

impl WebhookEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn exists(&self, event_id: &str) -> Result<bool, ServiceError> {
        Ok(webhook_event::Entity::find_by_id(event_id.to_string())
            .one(self.base.get_db())
            .await?
            .is_some())
    }

    /// Records a delivery. Returns `false` when the event id was already
    /// recorded, i.e. this is a redelivery.
    pub async fn record(&self, event_id: &str, event_type: &str) -> Result<bool, ServiceError> {
        let event = webhook_event::ActiveModel {
            event_id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            received_at: Set(Utc::now()),
        };

        match event.insert(self.base.get_db()).await {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
