//! 硬件地址转换接口 trait 定义和注册

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关内存管理操作
///
/// 此 trait 抽象了 MMU 的硬件原语：直接映射区的地址换算、
/// 根页目录寄存器、分页/保护位开关以及单条 TLB 刷新。
/// 内核需要为具体架构实现此 trait。
pub trait ArchMmOps: Send + Sync {
    /// 将虚拟地址转换为物理地址（直接映射区域）
    ///
    /// # Safety
    /// 调用者必须确保虚拟地址已经映射
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize;

    /// 将物理地址转换为虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;

    /// 启用大页（4MB）与全局页支持
    ///
    /// # Safety
    /// 只能在分页初始化阶段调用
    unsafe fn enable_large_pages(&self);

    /// 将页目录的物理地址装入根页目录寄存器
    ///
    /// # Safety
    /// `root` 必须是一个完整构建的页目录，且覆盖当前正在执行的代码
    unsafe fn load_root(&self, root: usize);

    /// 同时打开分页与保护相关的控制位
    ///
    /// # Safety
    /// 当前执行的代码必须已经被恒等映射覆盖，否则会立即触发缺页
    unsafe fn enable_paging(&self);

    /// 刷新本地 TLB 中一个线性地址的缓存翻译
    fn flush_tlb(&self, laddr: usize);
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchMmOps) {
    let ptr = ops as *const dyn ArchMmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchMmOps, (usize, usize)>(ptr) };
    ARCH_OPS_DATA.store(data, Ordering::Release);
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchMmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("pmap: ArchMmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchMmOps>((data, vtable)) }
}
