pub mod health;
pub mod orders;
pub mod payments;
pub mod wallet;

use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::{
    entrepreneurs,
    order_status::OrderStatusService,
    orders::OrderService,
    payment_provider::ProviderRegistry,
    payments::PaymentService,
    visibility::Viewer,
    wallet::WalletService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Caller identity headers set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub payments: Arc<PaymentService>,
    pub wallet: Arc<WalletService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
        providers: ProviderRegistry,
    ) -> Self {
        let commerce = config.commerce.clone();
        Self {
            orders: Arc::new(OrderService::new(
                db.clone(),
                event_sender.clone(),
                commerce.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(
                db.clone(),
                event_sender.clone(),
                &commerce,
            )),
            payments: Arc::new(PaymentService::new(
                db.clone(),
                providers,
                event_sender.clone(),
                commerce.clone(),
            )),
            wallet: Arc::new(WalletService::new(db, event_sender, commerce)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CallerRole {
    Customer,
    Entrepreneur,
    Supplier,
    Staff,
}

/// The authenticated user making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: CallerRole,
}

impl Caller {
    /// Resolves which orders this caller may read. Entrepreneurs are mapped
    /// from their user id to their storefront profile.
    pub async fn viewer(&self, state: &AppState) -> Result<Viewer, ServiceError> {
        Ok(match self.role {
            CallerRole::Customer => Viewer::Customer {
                user_id: self.user_id,
            },
            CallerRole::Entrepreneur => Viewer::Entrepreneur {
                entrepreneur_id: self.entrepreneur_id(state).await?,
            },
            CallerRole::Supplier => Viewer::Supplier {
                supplier_id: self.user_id,
            },
            CallerRole::Staff => Viewer::Staff,
        })
    }

    /// The caller's entrepreneur profile id; other roles are forbidden.
    pub async fn entrepreneur_id(&self, state: &AppState) -> Result<Uuid, ServiceError> {
        if self.role != CallerRole::Entrepreneur {
            return Err(ServiceError::Forbidden(
                "Only entrepreneurs can access this resource".to_string(),
            ));
        }
        Ok(entrepreneurs::find_by_user(&*state.db, self.user_id).await?.id)
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing caller identity".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| ServiceError::Unauthorized("Malformed caller identity".to_string()))?;

        let role = header_str(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized("Missing caller role".to_string()))?;
        let role = role
            .parse::<CallerRole>()
            .map_err(|_| ServiceError::Unauthorized(format!("Unknown caller role '{}'", role)))?;

        Ok(Caller { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ServiceError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn caller_is_read_from_gateway_headers() {
        let user_id = Uuid::new_v4();
        let raw_id = user_id.to_string();
        let caller = extract(&[
            (USER_ID_HEADER, raw_id.as_str()),
            (USER_ROLE_HEADER, "Entrepreneur"),
        ])
        .await
        .unwrap();
        assert_eq!(caller.user_id, user_id);
        assert_eq!(caller.role, CallerRole::Entrepreneur);
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        let raw_id = Uuid::new_v4().to_string();
        assert!(matches!(
            extract(&[(USER_ROLE_HEADER, "customer")]).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, "nope"), (USER_ROLE_HEADER, "customer")]).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[(USER_ID_HEADER, raw_id.as_str()), (USER_ROLE_HEADER, "admin")]).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }
}
