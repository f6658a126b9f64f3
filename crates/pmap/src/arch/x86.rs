//! x86 内存管理操作
//!
//! 内核运行在启动阶段建立的恒等映射上，直接映射区的虚拟地址与物理地址相同。
//!
//! # 控制寄存器
//!
//! - **CR0**: 分页 (PG)、写保护 (WP)、对齐检查 (AM) 与 FPU 相关位
//! - **CR3**: 根页目录的物理地址
//! - **CR4**: 4MB 大页 (PSE) 与全局页 (PGE)

use core::arch::asm;

use crate::arch_ops::{ArchMmOps, register_arch_ops};

/// 保护模式
pub const CR0_PE: usize = 1 << 0;
/// 协处理器监视
pub const CR0_MP: usize = 1 << 1;
/// 协处理器仿真
pub const CR0_EM: usize = 1 << 2;
/// 任务已切换
pub const CR0_TS: usize = 1 << 3;
/// 数值错误
pub const CR0_NE: usize = 1 << 5;
/// 写保护：内核态也遵守只读页
pub const CR0_WP: usize = 1 << 16;
/// 对齐检查
pub const CR0_AM: usize = 1 << 18;
/// 分页
pub const CR0_PG: usize = 1 << 31;

/// 4MB 大页
pub const CR4_PSE: usize = 1 << 4;
/// 全局页
pub const CR4_PGE: usize = 1 << 7;

/// 打开分页后的 CR0
///
/// TS 与 EM 位被清除，FPU 可以直接使用。
pub const fn paging_cr0(cr0: usize) -> usize {
    (cr0 | CR0_PE | CR0_PG | CR0_AM | CR0_WP | CR0_NE | CR0_TS | CR0_MP) & !(CR0_TS | CR0_EM)
}

/// 打开大页与全局页后的 CR4
pub const fn large_page_cr4(cr4: usize) -> usize {
    cr4 | CR4_PSE | CR4_PGE
}

/// x86 架构的内存管理操作实现
struct X86MmOps;

impl ArchMmOps for X86MmOps {
    unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr
    }

    fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }

    unsafe fn enable_large_pages(&self) {
        let cr4: usize;
        unsafe {
            asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
            asm!("mov cr4, {}", in(reg) large_page_cr4(cr4), options(nostack, preserves_flags));
        }
    }

    unsafe fn load_root(&self, root: usize) {
        unsafe {
            asm!("mov cr3, {}", in(reg) root, options(nostack, preserves_flags));
        }
    }

    unsafe fn enable_paging(&self) {
        let cr0: usize;
        unsafe {
            asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
            asm!("mov cr0, {}", in(reg) paging_cr0(cr0), options(nostack, preserves_flags));
        }
    }

    fn flush_tlb(&self, laddr: usize) {
        // SAFETY: invlpg 只影响 TLB 中的缓存翻译
        unsafe {
            asm!("invlpg [{}]", in(reg) laddr, options(nostack, preserves_flags));
        }
    }
}

static X86_MM_OPS: X86MmOps = X86MmOps;

/// 注册 x86 架构的内存管理操作
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_mm_ops() {
    unsafe { register_arch_ops(&X86_MM_OPS) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paging_cr0() {
        let cr0 = paging_cr0(CR0_EM | CR0_TS | 0x10);
        assert_eq!(cr0 & (CR0_EM | CR0_TS), 0);
        assert_eq!(
            cr0,
            CR0_PE | CR0_MP | CR0_NE | CR0_WP | CR0_AM | CR0_PG | 0x10
        );
        assert_eq!(paging_cr0(0), 0x8005_0023);
    }

    #[test]
    fn test_large_page_cr4() {
        assert_eq!(large_page_cr4(0), 0x90);
        assert_eq!(large_page_cr4(0x20), 0xb0);
    }
}
