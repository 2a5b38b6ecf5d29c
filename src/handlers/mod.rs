pub mod auth;
pub mod carts;
pub mod categories;
pub mod common;
pub mod messages;
pub mod products;
pub mod shops;
pub mod templates;
pub mod users;
pub mod vendors;

use crate::{
    events::EventSender,
    services::{
        CartService, CatalogService, GradeService, MessageService, ShopService, StatisticsService,
        UserService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// The domain services, constructed once and cloned into the router state.
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub catalog: CatalogService,
    pub grades: GradeService,
    pub messages: MessageService,
    pub shops: ShopService,
    pub statistics: StatisticsService,
    pub users: UserService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            carts: CartService::new(db.clone(), event_sender.clone()),
            catalog: CatalogService::new(db.clone(), event_sender.clone()),
            grades: GradeService::new(db.clone(), event_sender.clone()),
            messages: MessageService::new(db.clone(), event_sender.clone()),
            shops: ShopService::new(db.clone(), event_sender.clone()),
            statistics: StatisticsService::new(db.clone()),
            users: UserService::new(db, event_sender),
        }
    }
}
