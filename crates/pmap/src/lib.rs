//! 两级页表映射层
//!
//! 管理每个进程的两级页表，把用户虚拟地址翻译到物理帧，
//! 物理帧在多个地址空间之间共享并以引用计数管理。
//!
//! - [`boot`]: 启动阶段的恒等映射与分页开启
//! - [`Pmap`]: 遍历、插入、反查、移除与 TLB 刷新
//! - [`AddressSpace`]: 拥有页目录的进程地址空间
//! - [`frame_allocator`]: 物理帧池与引用计数句柄
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`ArchMmOps`]: 直接映射换算、控制寄存器与 TLB 操作
//! - [`MmConfig`]: 可分配物理内存的范围
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod address_space;
mod arch_ops;
mod config;
mod mapper;

pub mod address;
pub mod arch;
pub mod boot;
pub mod frame_allocator;
pub mod page_table;

pub use address_space::AddressSpace;
pub use arch_ops::{ArchMmOps, arch_ops, register_arch_ops};
pub use config::{
    LIN_HIGH, LIN_USER, MmConfig, NPDENTRIES, NPTENTRIES, PAGE_SHIFT, PAGE_SIZE, PDX_SHIFT, PTSIZE,
    USER_LIMIT, mm_config, register_config,
};
pub use mapper::Pmap;

// Re-export 常用类型
pub use address::{AlignOps, Laddr, PageNum, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr};
pub use frame_allocator::{Frame, FrameArena, alloc_frame, frame_arena};
pub use page_table::{
    Page, PageDirectory, PageTableEntry, PagingError, PagingResult, PteFlags, PteSlot,
};
