//! The lazy flag thunk (spec §3, §4.B, §4.C).
//!
//! A [`Thunk`] is the four-word record attached to [`crate::state::GuestState`]
//! that names the last flag-affecting operation symbolically instead of
//! materializing N/Z/C/V eagerly. [`eval`] reconstructs flags from it on
//! demand; [`spechelper`] lets an IR optimizer fold the common
//! condition-right-after-comparison pattern into a direct comparison without
//! ever forming all four bits.

pub mod eval;
pub mod spechelper;

/// Bit position of each flag within a packed NZCV word (spec §3, §4.B).
pub const SHIFT_N: i32 = 31;
pub const SHIFT_Z: i32 = 30;
pub const SHIFT_C: i32 = 29;
pub const SHIFT_V: i32 = 28;

pub const MASK_N: u32 = 1 << SHIFT_N;
pub const MASK_Z: u32 = 1 << SHIFT_Z;
pub const MASK_C: u32 = 1 << SHIFT_C;
pub const MASK_V: u32 = 1 << SHIFT_V;
pub const MASK_NZCV: u32 = MASK_N | MASK_Z | MASK_C | MASK_V;

/// The thunk's discriminant: which architectural rule reconstructs NZCV from
/// `(dep1, dep2, dep3)`. Encoded as a small integer (spec §3 table) because
/// that integer is the on-wire ABI translated code writes into
/// [`crate::state::GuestState::cc_op`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CcOp {
    /// `(packed NZCV, —, —)`: flags already materialized.
    Copy = 0,
    /// `(argL, argR, —)`: flags as if `argL + argR` had just run.
    Add = 1,
    /// `(argL, argR, —)`: flags as if `argL − argR` had just run.
    Sub = 2,
    /// `(argL, argR, oldC)`: add with carry-in.
    Adc = 3,
    /// `(argL, argR, oldC)`: subtract with borrow (carry inverted).
    Sbb = 4,
    /// `(result, shifter-C, oldV)`: bitwise ops preserve V, take C from the shifter.
    Logic = 5,
    /// `(result, —, (oldC<<1)|oldV)`: C, V preserved across a multiply.
    Mul = 6,
    /// `(resLo, resHi, (oldC<<1)|oldV)`: long multiply; N/Z from the 64-bit result.
    Mull = 7,
}

impl CcOp {
    /// Recovers a `CcOp` from its thunk-wire encoding, or `None` for an
    /// unknown value — callers turn that into a fatal [`crate::CoreFault`].
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => CcOp::Copy,
            1 => CcOp::Add,
            2 => CcOp::Sub,
            3 => CcOp::Adc,
            4 => CcOp::Sbb,
            5 => CcOp::Logic,
            6 => CcOp::Mul,
            7 => CcOp::Mull,
            _ => return None,
        })
    }
}

/// The fourteen architectural condition predicates (spec §4.B), in the
/// standard even/odd-inverse-pair encoding: `cond >> 1` selects the
/// predicate family, `cond & 1` inverts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Condition {
    Eq = 0,
    Ne = 1,
    Hs = 2,
    Lo = 3,
    Mi = 4,
    Pl = 5,
    Vs = 6,
    Vc = 7,
    Hi = 8,
    Ls = 9,
    Ge = 10,
    Lt = 11,
    Gt = 12,
    Le = 13,
}

impl Condition {
    /// Recovers a `Condition` from its encoding. Codes 14 ("always") and 15
    /// ("never") are forbidden — they must never reach the evaluator — and
    /// are returned as `None` so the caller can raise the fatal fault with
    /// the right message.
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Condition::Eq,
            1 => Condition::Ne,
            2 => Condition::Hs,
            3 => Condition::Lo,
            4 => Condition::Mi,
            5 => Condition::Pl,
            6 => Condition::Vs,
            7 => Condition::Vc,
            8 => Condition::Hi,
            9 => Condition::Ls,
            10 => Condition::Ge,
            11 => Condition::Lt,
            12 => Condition::Gt,
            13 => Condition::Le,
            _ => return None,
        })
    }

    /// `true` for the odd ("inverse") half of each pair, e.g. `Ne`, `Lo`, `Pl`.
    pub fn is_inverse(self) -> bool {
        (self as u32) & 1 == 1
    }
}

/// Generalised left-shifter: negative `n` shifts right. Mirrors the `lshift`
/// helper in `guest_arm_helpers.c`, which the NZCV bit-placement arithmetic
/// below is built from directly.
#[inline]
pub(crate) fn lshift(x: u32, n: i32) -> u32 {
    if n >= 0 {
        x << n
    } else {
        x >> (-n)
    }
}
