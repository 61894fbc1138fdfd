//! Lookups of entrepreneur storefronts shared by the order and wallet services.

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{entities::entrepreneur, errors::ServiceError};

/// Resolves an active storefront by its public slug.
pub async fn find_active_by_slug<C: ConnectionTrait>(
    conn: &C,
    slug: &str,
) -> Result<entrepreneur::Model, ServiceError> {
    entrepreneur::Entity::find()
        .filter(entrepreneur::Column::Slug.eq(slug))
        .filter(entrepreneur::Column::IsActive.eq(true))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Entrepreneur '{}' not found or inactive", slug)))
}

/// Resolves the entrepreneur profile owned by `user_id`.
pub async fn find_by_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<entrepreneur::Model, ServiceError> {
    entrepreneur::Entity::find()
        .filter(entrepreneur::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("No entrepreneur profile for user {}", user_id)))
}

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    entrepreneur_id: Uuid,
) -> Result<entrepreneur::Model, ServiceError> {
    entrepreneur::Entity::find_by_id(entrepreneur_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Entrepreneur {} not found", entrepreneur_id)))
}
