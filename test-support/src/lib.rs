//! 测试支持 crate
//!
//! 提供 Mock 实现和测试工具。本 crate 只在宿主机测试中使用，因此依赖 `std`。

pub mod mock;
