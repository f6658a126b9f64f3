//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `pmap` crate（避免循环依赖）。
//! `pmap` crate 在 `cfg(test)` 下为这些类型实现其 trait（例如 `ArchMmOps` / `MmConfig`），
//! 集成测试则用本地包装类型转发。

use std::cell::RefCell;

/// 被记录下来的 MMU 操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuEvent {
    /// 打开大页与全局页
    EnableLargePages,
    /// 装入根页目录（物理地址）
    LoadRoot(usize),
    /// 打开分页
    EnablePaging,
    /// 刷新一个线性地址的 TLB
    FlushTlb(usize),
}

thread_local! {
    // 按线程记录，并行运行的测试互不干扰
    static EVENTS: RefCell<Vec<MmuEvent>> = const { RefCell::new(Vec::new()) };
}

fn record(event: MmuEvent) {
    EVENTS.with(|events| events.borrow_mut().push(event));
}

/// Mock 的内存管理架构操作
///
/// 默认实现采用“恒等映射”（vaddr == paddr）；控制寄存器与 TLB 操作只被记录，
/// 由测试通过 [`MockMmOps::take_events`] 检查。
pub struct MockMmOps;

impl MockMmOps {
    /// 创建实例
    pub const fn new() -> Self {
        Self
    }

    /// 将虚拟地址转换为物理地址（测试默认：恒等映射）
    ///
    /// # Safety
    /// 仅用于测试环境的可控输入。
    pub unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }

    /// 记录打开大页
    pub fn enable_large_pages(&self) {
        record(MmuEvent::EnableLargePages);
    }

    /// 记录装入根页目录
    pub fn load_root(&self, root: usize) {
        record(MmuEvent::LoadRoot(root));
    }

    /// 记录打开分页
    pub fn enable_paging(&self) {
        record(MmuEvent::EnablePaging);
    }

    /// 记录 TLB 刷新
    pub fn flush_tlb(&self, laddr: usize) {
        record(MmuEvent::FlushTlb(laddr));
    }

    /// 取出当前线程记录的全部事件
    pub fn take_events(&self) -> Vec<MmuEvent> {
        EVENTS.with(|events| core::mem::take(&mut *events.borrow_mut()))
    }

    /// 取出当前线程记录的 TLB 刷新地址，丢弃其他事件
    pub fn flushed(&self) -> Vec<usize> {
        self.take_events()
            .into_iter()
            .filter_map(|event| match event {
                MmuEvent::FlushTlb(laddr) => Some(laddr),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockMmOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_OPS: MockMmOps = MockMmOps::new();

/// Mock 的内存管理配置
pub struct MockMmConfig;

impl MockMmConfig {
    /// 创建实例
    pub const fn new() -> Self {
        Self
    }

    /// 可分配物理内存的起始地址
    pub fn memory_start(&self) -> usize {
        0x0010_0000
    }

    /// 可分配物理内存的结束地址
    pub fn memory_end(&self) -> usize {
        // 仅供测试：4MB
        0x0050_0000
    }
}

impl Default for MockMmConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_CONFIG: MockMmConfig = MockMmConfig::new();
