//! 地址模块
//!
//! 此模块提供了物理地址、用户虚拟地址、线性地址，
//! 以及物理页码的抽象。
//!
//! # 地址类型
//!
//! - [`Paddr`] - 物理地址类型
//! - [`Vaddr`] - 用户虚拟地址类型
//! - [`Laddr`] - 线性地址类型（用户虚拟地址 + [`crate::LIN_USER`]）
//!
//! # 页码
//!
//! - [`PageNum`] - 表示页码的 Trait
//! - [`Ppn`] - 物理页码（Physical Page Number）
//! - [`PpnRange`] - 物理页码范围
//!
//! # 操作
//!
//! - [`UsizeConvert`] - 在类型和 usize 之间进行转换
//! - [`AlignOps`] - 地址对齐操作
pub mod page_num;
pub mod types;

pub use page_num::{PageNum, PageNumRange, Ppn, PpnRange};
pub use types::{Address, AlignOps, Laddr, Paddr, UsizeConvert, Vaddr};
