//! 架构相关实现
//!
//! 目前只有 32 位 x86 的两级分页。

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod x86;
