pub mod cart;
pub mod cart_line;
pub mod category;
pub mod client_profile;
pub mod message;
pub mod product;
pub mod product_image;
pub mod sales_statistic;
pub mod seller_grade;
pub mod session;
pub mod shop;
pub mod shop_template;
pub mod user;
pub mod vendor_profile;

// Re-export entities under their domain names
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_line::{Entity as CartLine, Model as CartLineModel};
pub use category::{Entity as Category, Model as CategoryModel};
pub use client_profile::{Entity as ClientProfile, Model as ClientProfileModel};
pub use message::{
    Entity as Message, MessageKind, MessagePriority, MessageStatus, Model as MessageModel,
};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus, StockStatus};
pub use product_image::{Entity as ProductImage, Model as ProductImageModel};
pub use sales_statistic::{Entity as SalesStatistic, Model as SalesStatisticModel};
pub use seller_grade::{Entity as SellerGrade, GradeTier, Model as SellerGradeModel};
pub use session::{Entity as Session, Model as SessionModel};
pub use shop::{Entity as Shop, Model as ShopModel};
pub use shop_template::{Entity as ShopTemplate, Model as ShopTemplateModel};
pub use user::{Entity as User, Model as UserModel, UserRole};
pub use vendor_profile::{Entity as VendorProfile, Model as VendorProfileModel};
