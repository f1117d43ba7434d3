//! 二手交易平台核心领域模型
//!
//! 包含用户、商品、分类、评价、会话与消息等核心实体，以及相关的校验规则。

pub mod category;
pub mod conversation;
pub mod errors;
pub mod listing;
pub mod message;
pub mod query;
pub mod review;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use category::*;
pub use conversation::*;
pub use errors::*;
pub use listing::*;
pub use message::*;
pub use query::*;
pub use review::*;
pub use user::*;
pub use value_objects::*;
