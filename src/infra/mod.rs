//! 基础设施模块
//!
//! 封装外部依赖（站点登记数据库）

pub mod site_registry;

pub use site_registry::SiteRegistry;
