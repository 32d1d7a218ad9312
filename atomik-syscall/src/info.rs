//! Register frame and the `cap_get_info` record

/// Registers taking part in a syscall.
#[repr(usize)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register {
    /// Syscall number on entry, result on exit.
    Eax = 0,
    /// First argument.
    Ebx = 1,
    /// Second argument.
    Ecx = 2,
    /// Third argument.
    Edx = 3,
    /// Fourth argument.
    Esi = 4,
    /// Fifth argument.
    Edi = 5,
}

/// General-purpose registers saved at syscall entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyscallFrame {
    /// Register values, indexed by [`Register`].
    pub regs: [u32; 6],
}

impl SyscallFrame {
    /// Frame for syscall `number` with up to five arguments.
    #[must_use]
    pub fn new(number: u32, args: &[u32]) -> Self {
        let mut regs = [0; 6];
        regs[0] = number;
        for (reg, &arg) in regs[1..].iter_mut().zip(args) {
            *reg = arg;
        }
        Self { regs }
    }

    /// Syscall number.
    #[inline]
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.regs[Register::Eax as usize]
    }

    /// Argument `n` (0-based, `ebx` first), or 0 past the fifth.
    #[inline]
    #[must_use]
    pub const fn arg(&self, n: usize) -> u32 {
        if n < 5 { self.regs[n + 1] } else { 0 }
    }

    /// Read a register.
    #[inline]
    #[must_use]
    pub const fn get(&self, reg: Register) -> u32 {
        self.regs[reg as usize]
    }

    /// Write a register.
    #[inline]
    pub const fn set(&mut self, reg: Register, value: u32) {
        self.regs[reg as usize] = value;
    }

    /// Signed result in `eax`.
    #[inline]
    #[must_use]
    pub const fn result(&self) -> i32 {
        self.regs[Register::Eax as usize] as i32
    }

    /// Store a signed result in `eax`.
    #[inline]
    pub const fn set_result(&mut self, value: i32) {
        self.regs[Register::Eax as usize] = value as u32;
    }
}

/// Capability description returned by `cap_get_info`.
///
/// Fields that do not apply to the object type are zero. On return the
/// record is packed as:
///
/// | Register | Contents |
/// |----------|----------|
/// | `eax` | object type |
/// | `ebx` | size bits |
/// | `ecx` | access, guard bits in bits 8..16 |
/// | `edx` | guard |
/// | `esi` | physical base |
/// | `edi` | mapped vaddr, or watermark for Untyped |
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapInfo {
    /// Object type tag.
    pub object_type: u32,
    /// Object size as log2 (entries for a CNode).
    pub size_bits: u8,
    /// Access bits.
    pub access: u8,
    /// CNode guard width.
    pub guard_bits: u8,
    /// CNode guard value.
    pub guard: u32,
    /// Physical base address.
    pub paddr: u32,
    /// Mapped virtual address (Page, PageTable) or watermark (Untyped).
    pub vaddr: u32,
}

impl CapInfo {
    /// Pack into the return registers.
    pub fn store(&self, frame: &mut SyscallFrame) {
        frame.set(Register::Eax, self.object_type);
        frame.set(Register::Ebx, u32::from(self.size_bits));
        frame.set(
            Register::Ecx,
            u32::from(self.access) | (u32::from(self.guard_bits) << 8),
        );
        frame.set(Register::Edx, self.guard);
        frame.set(Register::Esi, self.paddr);
        frame.set(Register::Edi, self.vaddr);
    }

    /// Unpack from the return registers.
    #[must_use]
    pub fn load(frame: &SyscallFrame) -> Self {
        let ecx = frame.get(Register::Ecx);
        Self {
            object_type: frame.get(Register::Eax),
            size_bits: frame.get(Register::Ebx) as u8,
            access: ecx as u8,
            guard_bits: (ecx >> 8) as u8,
            guard: frame.get(Register::Edx),
            paddr: frame.get(Register::Esi),
            vaddr: frame.get(Register::Edi),
        }
    }
}
