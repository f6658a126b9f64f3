//! 内存布局常量与运行时配置
//!
//! 地址布局常量是固定的：本 crate 之外的调用者必须使用完全相同的值，
//! 否则地址转换会悄无声息地落到错误的区域。
//!
//! 物理内存范围等与平台相关的参数通过 [`MmConfig`] 在启动时注册。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 页大小（4KB）
pub const PAGE_SIZE: usize = 0x1000;
/// 页内偏移位数
pub const PAGE_SHIFT: usize = 12;
/// 页目录索引在线性地址中的起始位
pub const PDX_SHIFT: usize = 22;
/// 一个页目录项覆盖的区域大小（4MB）
pub const PTSIZE: usize = PAGE_SIZE * NPTENTRIES;
/// 每个页目录中的目录项数量
pub const NPDENTRIES: usize = 1024;
/// 每个页表中的页表项数量
pub const NPTENTRIES: usize = 1024;

/// 用户虚拟地址 0 对应的线性地址
///
/// 每次遍历前都会把该偏移加到用户虚拟地址上。
pub const LIN_USER: usize = 0x4000_0000;
/// 用户可达线性地址空间的结束位置（不包含）
pub const LIN_HIGH: usize = 0xF000_0000;
/// 用户虚拟地址上界（不包含）
pub const USER_LIMIT: usize = LIN_HIGH - LIN_USER;

/// 内存管理配置
///
/// 提供与平台相关的物理内存范围，用于构建全局帧池。
/// 内核需要实现此 trait 并注册。
pub trait MmConfig: Send + Sync {
    /// 可分配物理内存的起始地址
    fn memory_start(&self) -> usize;

    /// 可分配物理内存的结束地址（不包含）
    fn memory_end(&self) -> usize;
}

static CONFIG_DATA: AtomicUsize = AtomicUsize::new(0);
static CONFIG_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册配置实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_config(config: &'static dyn MmConfig) {
    let ptr = config as *const dyn MmConfig;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn MmConfig, (usize, usize)>(ptr) };
    CONFIG_DATA.store(data, Ordering::Release);
    CONFIG_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的配置实现
///
/// # Panics
/// 如果尚未调用 [`register_config`] 注册实现，则 panic
#[inline]
pub fn mm_config() -> &'static dyn MmConfig {
    let data = CONFIG_DATA.load(Ordering::Acquire);
    let vtable = CONFIG_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("pmap: MmConfig not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn MmConfig>((data, vtable)) }
}
