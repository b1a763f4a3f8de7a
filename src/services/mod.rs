//! 业务服务模块

pub mod provision;

pub use provision::Provisioner;
