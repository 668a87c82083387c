//! Flag Thunk Specializer (spec §4.C).
//!
//! An IR optimizer calls [`spec_helper`] whenever it finds a call to one of
//! the flag-evaluation helpers with constant-foldable arguments. On a
//! recognized pattern it returns an equivalent expression that never forms
//! all four NZCV bits; otherwise it returns `None` and the optimizer leaves
//! the call alone. Grounded on `guest_arm_spechelper` in
//! `guest_arm_helpers.c`, including its exact choice of which operand to
//! swap for `GE`/`GT` (rather than negating the `LE`/`LT` result).
//!
//! Pure: no side effects, no allocation beyond the returned expression tree.

use crate::flags::{CcOp, Condition};
use crate::ir::IRExpr;

/// One of the four clean helpers a translated block can call at run time
/// (spec §6). Only `CalcCondition` has a specialization table today; the
/// others are listed so a caller can route all four helper names through
/// one dispatcher without a separate "is this even a flag helper" check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperName {
    CalcNzcv,
    CalcFlagC,
    CalcFlagV,
    CalcCondition,
}

impl HelperName {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "calc_nzcv" => HelperName::CalcNzcv,
            "calc_flag_c" => HelperName::CalcFlagC,
            "calc_flag_v" => HelperName::CalcFlagV,
            "calc_condition" => HelperName::CalcCondition,
            _ => return None,
        })
    }
}

/// `spechelper(name, args) -> IR-expr | none` (spec §6). `args` must be the
/// four operands `(cond_n_op, dep1, dep2, dep3)` the helper would have been
/// called with. Returns `None` — "no specialization" — for anything the
/// table below doesn't recognize; never panics on an unrecognized pattern
/// (only a genuinely malformed call, e.g. wrong arity, is a caller bug).
pub fn spec_helper(name: HelperName, args: &[IRExpr; 4]) -> Option<IRExpr> {
    if name != HelperName::CalcCondition {
        return None;
    }
    let cond_n_op = args[0].as_const_u32()?;
    let dep1 = args[1].clone();
    let dep2 = args[2].clone();

    let cond_raw = cond_n_op >> 4;
    let cc_op = cond_n_op & 0xF;
    let cond = Condition::from_u32(cond_raw)?;
    let op = CcOp::from_u32(cc_op)?;

    match op {
        CcOp::Sub => specialize_after_sub(cond, dep1, dep2),
        CcOp::Logic => specialize_after_logic(cond, dep1),
        _ => None,
    }
}

fn specialize_after_sub(cond: Condition, dep1: IRExpr, dep2: IRExpr) -> Option<IRExpr> {
    use Condition::*;
    Some(match cond {
        Eq => IRExpr::eq32(dep1, dep2),
        Ne => IRExpr::ne32(dep1, dep2),
        Le => IRExpr::le_s32(dep1, dep2),
        Lt => IRExpr::lt_s32(dep1, dep2),
        // GE after SUB --> argL >=s argR --> argR <=s argL
        Ge => IRExpr::le_s32(dep2, dep1),
        // GT after SUB --> argL >s argR --> argR <s argL
        Gt => IRExpr::lt_s32(dep2, dep1),
        // HS after SUB --> argL >=u argR --> argR <=u argL
        Hs => IRExpr::le_u32(dep2, dep1),
        // LS after SUB --> argL <=u argR
        Ls => IRExpr::le_u32(dep1, dep2),
        _ => return None,
    })
}

fn specialize_after_logic(cond: Condition, dep1: IRExpr) -> Option<IRExpr> {
    use Condition::*;
    Some(match cond {
        Eq => IRExpr::eq32(dep1, IRExpr::const_u32(0)),
        Ne => IRExpr::ne32(dep1, IRExpr::const_u32(0)),
        _ => return None,
    })
}
