pub mod carts;
pub mod catalog;
pub mod grades;
pub mod messages;
pub mod shops;
pub mod statistics;
pub mod users;

pub use carts::CartService;
pub use catalog::CatalogService;
pub use grades::GradeService;
pub use messages::MessageService;
pub use shops::ShopService;
pub use statistics::StatisticsService;
pub use users::UserService;
