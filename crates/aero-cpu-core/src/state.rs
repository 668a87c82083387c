//! Guest CPU state and the static layout description of it (spec §3, §4.F).
//!
//! [`GuestState`] is the flat record a translated block reads and writes
//! directly by byte offset; [`GuestStateLayout`] is the static description a
//! caller (the would-be back end, out of scope here) needs in order to
//! generate those offsetted accesses and to decide which stores require
//! precise exception state. Grounded on the `VexGuestARMState` layout
//! documented in `guest_arm_helpers.c` (field order: GPRs, `CC_OP`/`CC_DEP1-3`,
//! `CC_NDEP`, `IP_AT_SYSCALL`, `EMWARN`, `TISTART`/`TILEN`, `NRADDR`) and on
//! the `memoffset`-based ABI assertion style in the teacher's `tests/abi.rs`.

use crate::flags::{self, CcOp};

/// Number of general-purpose guest integer registers modeled. ARM has 16
/// (R0-R15, with R11=frame pointer, R13=SP, R14=LR, R15=PC); this crate is
/// not itself ISA-specific (spec §4.D Non-goals) but the flag-thunk
/// evaluator it hosts is fixed 32-bit ARM arithmetic, so the register file
/// is sized to match.
pub const NUM_GPRS: usize = 16;

/// Index of the frame pointer within [`GuestState::gpr`]. Required for
/// correct stack unwinding even though nothing architectural distinguishes
/// it from any other GPR; `armGuest_layout` in `guest_arm_helpers.c` folds
/// it into `requires_precise_mem_exns` for exactly this reason.
pub const FP_INDEX: usize = 11;
/// Index of the stack pointer within [`GuestState::gpr`].
pub const SP_INDEX: usize = 13;
/// Index of the program counter within [`GuestState::gpr`].
pub const PC_INDEX: usize = 15;

/// Byte offset of guest register `index` within [`GuestState`], assuming
/// the conceptual flat layout §3/§4.D describe (GPRs first, each
/// `word_bytes` wide, followed by the thunk and bookkeeping scalars below).
/// This is the layout the *descriptor* advertises to a back end; it need
/// not equal this struct's actual Rust field layout. Its order is fixed
/// regardless of `GuestWordType` because every field after the GPR array is
/// a plain `u32` in [`GuestState`] today (spec's floating-point slots are
/// opaque and excluded, per Non-goals).
pub const fn gpr_offset(index: usize, word_bytes: usize) -> usize {
    index * word_bytes
}

/// Total size in bytes of the GPR bank for a given guest word width.
const fn gpr_bank_size(word_bytes: usize) -> usize {
    NUM_GPRS * word_bytes
}

/// Width in bytes of every scalar field declared after [`GuestState::gpr`]
/// — the thunk and bookkeeping words are always `u32` regardless of guest
/// word width (spec §3's Data Model lists them as plain words, not
/// register-width slots).
const SCALAR_FIELD_WIDTH: usize = 4;

/// The flat guest-state record a translated block addresses by offset
/// (spec §3, §4.F). All integer registers are stored at their native guest
/// width; the flag thunk and the handful of auxiliary fields below it are
/// always present regardless of guest word width. `repr(C)` because
/// translated code and [`GuestStateLayout`] both address this struct by
/// raw byte offset, not by field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GuestState {
    pub gpr: [u32; NUM_GPRS],

    /// The lazy flag thunk (spec §3): which rule reconstructs NZCV, and its
    /// up to three dependency words.
    pub cc_op: u32,
    pub cc_dep1: u32,
    pub cc_dep2: u32,
    pub cc_dep3: u32,

    /// PC value saved across a system call, so a restarted or re-entered
    /// syscall can be resumed correctly.
    pub ip_at_syscall: u32,
    /// Address LibVEX-style front ends stash here for `NRADDR` helper reads;
    /// the decoder's self-check preamble does not touch this field itself,
    /// but `bb_to_IR`'s `do_set_NRADDR` always emits the `Put` that zeroes it
    /// at block entry (spec mirrors `bb_to_IR.c`).
    pub nraddr: u32,
    /// Start address of the most recent `TISTART`/`TILEN`-tracked write,
    /// for helpers that special-case self-modifying-code writes.
    pub ti_start: u32,
    pub ti_len: u32,
    /// Sticky "the guest did something we only partially model" flag,
    /// surfaced to a caller rather than silently dropped.
    pub emwarn: u32,

    /// Opaque placeholder for FP/SIMD register state (spec Non-goals: this
    /// crate never reads or writes through it). Present only so
    /// [`GuestStateLayout::total_size_bytes`] matches a real guest state's size
    /// and nothing downstream needs a special case for "there's no FPU
    /// block here".
    pub fpu_opaque: [u8; 32],
}

impl GuestState {
    /// `LibVEX_GuestARM_initialise` (spec §4.F): zero every GPR and every
    /// auxiliary field, with flags reset to "already computed, value zero".
    pub fn initialise() -> Self {
        GuestState {
            gpr: [0; NUM_GPRS],
            cc_op: CcOp::Copy as u32,
            cc_dep1: 0,
            cc_dep2: 0,
            cc_dep3: 0,
            ip_at_syscall: 0,
            nraddr: 0,
            ti_start: 0,
            ti_len: 0,
            emwarn: 0,
            fpu_opaque: [0; 32],
        }
    }

    /// `LibVEX_GuestARM_get_cpsr`-equivalent (spec §4.F): evaluates the
    /// thunk and packs NZCV into bits 31-28, matching the eval module's bit
    /// placement exactly.
    pub fn get_cpsr_nzcv(&self) -> u32 {
        flags::eval::nzcv(self.cc_op, self.cc_dep1, self.cc_dep2, self.cc_dep3)
    }

    /// Overwrites the thunk so the next flag read reconstructs exactly
    /// `nzcv` (bits 31-28; other bits ignored) via `CcOp::Copy`. This is how
    /// a non-flag-affecting instruction (or a guest write to CPSR) forces a
    /// materialized flags value back into thunk form.
    pub fn put_flags(&mut self, nzcv: u32) {
        self.cc_op = CcOp::Copy as u32;
        self.cc_dep1 = nzcv & flags::MASK_NZCV;
        self.cc_dep2 = 0;
        self.cc_dep3 = 0;
    }
}

impl Default for GuestState {
    fn default() -> Self {
        Self::initialise()
    }
}

/// A guest integer register's native width (spec §4.D: the decoder and
/// state layout are parameterized over this; the flag evaluator they host
/// is not — it is always 32-bit ARM arithmetic regardless).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestWordType {
    Bit32,
    Bit64,
}

impl GuestWordType {
    pub fn bytes(self) -> u32 {
        match self {
            GuestWordType::Bit32 => 4,
            GuestWordType::Bit64 => 8,
        }
    }
}

/// One named scalar field after the GPR bank, in [`GuestState`]'s
/// declaration order — used to compute its conceptual byte offset for
/// [`GuestStateLayout`] (spec §4.D: the "always defined" regions and the
/// bookkeeping scalars named in §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarField {
    CcOp,
    CcDep1,
    CcDep2,
    CcDep3,
    IpAtSyscall,
    Nraddr,
    TiStart,
    TiLen,
    Emwarn,
}

impl ScalarField {
    const ALL: [ScalarField; 9] = [
        ScalarField::CcOp,
        ScalarField::CcDep1,
        ScalarField::CcDep2,
        ScalarField::CcDep3,
        ScalarField::IpAtSyscall,
        ScalarField::Nraddr,
        ScalarField::TiStart,
        ScalarField::TiLen,
        ScalarField::Emwarn,
    ];

    const fn index(self) -> usize {
        match self {
            ScalarField::CcOp => 0,
            ScalarField::CcDep1 => 1,
            ScalarField::CcDep2 => 2,
            ScalarField::CcDep3 => 3,
            ScalarField::IpAtSyscall => 4,
            ScalarField::Nraddr => 5,
            ScalarField::TiStart => 6,
            ScalarField::TiLen => 7,
            ScalarField::Emwarn => 8,
        }
    }
}

/// A `(offset, len)` byte range, matching the shape `ALWAYSDEFD` builds in
/// `guest_arm_helpers.c` (`offsetof(...)`, `sizeof(...)`).
pub type ByteRange = (usize, usize);

/// The static, caller-facing description of [`GuestState`]'s layout
/// (spec §4.D, §4.F): total size, `(offset, width)` of SP and IP, and the
/// "always defined" regions an uninitialized-memory checker must treat as
/// defined regardless of what the guest program has actually written.
/// A back end (out of scope here) uses this to generate the right
/// offsetted load/store and to decide when a write needs to flush precise
/// register state before it takes effect. Grounded field-for-field on
/// `armGuest_layout` in `guest_arm_helpers.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuestStateLayout {
    pub word_type: GuestWordType,
    pub sp_index: usize,
    pub ip_index: usize,
    pub fp_index: usize,
}

impl GuestStateLayout {
    pub const fn new(word_type: GuestWordType) -> Self {
        GuestStateLayout {
            word_type,
            sp_index: SP_INDEX,
            ip_index: PC_INDEX,
            fp_index: FP_INDEX,
        }
    }

    fn word_bytes(&self) -> usize {
        self.word_type.bytes() as usize
    }

    /// `(offset, width)` of a GPR bank slot, e.g. the stack or instruction
    /// pointer (spec §4.D).
    pub fn gpr_range(&self, index: usize) -> ByteRange {
        (gpr_offset(index, self.word_bytes()), self.word_bytes())
    }

    pub fn sp_range(&self) -> ByteRange {
        self.gpr_range(self.sp_index)
    }

    pub fn ip_range(&self) -> ByteRange {
        self.gpr_range(self.ip_index)
    }

    fn scalar_range(&self, field: ScalarField) -> ByteRange {
        let offset = gpr_bank_size(self.word_bytes()) + field.index() * SCALAR_FIELD_WIDTH;
        (offset, SCALAR_FIELD_WIDTH)
    }

    /// Total size in bytes of the guest-state region this layout describes:
    /// the GPR bank, the nine scalar fields that follow it, and the opaque
    /// FP/SIMD tail (spec §4.D "total size in bytes"; FP/SIMD contents are a
    /// Non-goal, but its *extent* still counts towards the state's size).
    pub fn total_size_bytes(&self) -> usize {
        gpr_bank_size(self.word_bytes())
            + ScalarField::ALL.len() * SCALAR_FIELD_WIDTH
            + std::mem::size_of_val(&GuestState::initialise().fpu_opaque)
    }

    /// The "always defined" regions (spec §4.D): byte ranges the
    /// uninitialized-memory checker must treat as defined even when nothing
    /// has written them yet. Matches `armGuest_layout.alwaysDefd` exactly:
    /// the IP slot, then every bookkeeping scalar named in spec §3 — `cc_op`
    /// is always-defined because the *dependency* words, not the
    /// discriminant, are what legitimately start out untracked.
    pub fn always_defined_regions(&self) -> Vec<ByteRange> {
        let mut regions = vec![self.ip_range()];
        regions.push(self.scalar_range(ScalarField::CcOp));
        regions.push(self.scalar_range(ScalarField::Emwarn));
        regions.push(self.scalar_range(ScalarField::TiStart));
        regions.push(self.scalar_range(ScalarField::TiLen));
        regions.push(self.scalar_range(ScalarField::Nraddr));
        regions.push(self.scalar_range(ScalarField::IpAtSyscall));
        regions
    }

    /// Whether a write touching the half-open guest-register byte range
    /// `[min_off, max_off)` needs the CPU's memory-exception state to be
    /// precise at that point (spec §4.F). Scoped to SP, IP, and FP — the
    /// source enforces precise exceptions for FP too, "to get proper
    /// stacktraces from non-optimised code" (`guest_arm_helpers.c`).
    pub fn requires_precise_mem_exns(&self, min_off: usize, max_off: usize) -> bool {
        let touches = |(lo, len): ByteRange| -> bool {
            let hi = lo + len;
            min_off < hi && max_off > lo
        };
        touches(self.sp_range()) || touches(self.ip_range()) || touches(self.gpr_range(self.fp_index))
    }
}
