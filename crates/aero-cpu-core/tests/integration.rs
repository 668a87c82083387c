use aero_cpu_core::decoder::{bb_to_ir, DecoderConfig, DisInstrFn, DisResult, WhatNext};
use aero_cpu_core::flags::{eval, CcOp, Condition};
use aero_cpu_core::ir::{Addr, IRExpr, JumpKind, Stmt, SuperBlock};
use aero_cpu_core::state::{GuestState, GuestWordType};

struct ArchInfo;

struct ScriptedDecoder {
    script: Vec<DisResult>,
    calls: usize,
    stop_target: Option<Addr>,
}

impl ScriptedDecoder {
    fn new(script: Vec<DisResult>, stop_target: Option<Addr>) -> Self {
        ScriptedDecoder { script, calls: 0, stop_target }
    }
}

impl DisInstrFn<ArchInfo> for ScriptedDecoder {
    fn decode_one(
        &mut self,
        sb: &mut SuperBlock,
        _need_to_put_ip: bool,
        _resteer_fn: &dyn Fn(Addr) -> bool,
        _guest_code: &[u8],
        _delta: u32,
        _guest_ip_curr: Addr,
        _archinfo_guest: &ArchInfo,
        _host_bigendian: bool,
    ) -> DisResult {
        let result = self.script[self.calls];
        self.calls += 1;
        if result.what_next == WhatNext::StopHere {
            if let Some(target) = self.stop_target {
                sb.next = Some(IRExpr::const_u32(target as u32));
                sb.jumpkind = JumpKind::Boring;
            }
        }
        result
    }
}

/// Testable property 8 (spec §8): `vge.n_used <= 3`, `n_instrs <=
/// guest_max_insns`, and — when present — the self-check preamble
/// occupies exactly the first five statements, exercised end to end
/// through the crate's public API only (no internal field access beyond
/// what a real caller would have).
#[test]
fn decoded_block_respects_its_own_bounds_with_a_self_check_preamble() {
    let cfg = DecoderConfig::new(6, 0, true, false, GuestWordType::Bit32, false, 8, 12, 0)
        .expect("valid decoder config");

    let mut decoder = ScriptedDecoder::new(
        vec![
            DisResult { what_next: WhatNext::Continue, len: 4, continue_at: 0 },
            DisResult { what_next: WhatNext::Continue, len: 4, continue_at: 0 },
            DisResult { what_next: WhatNext::StopHere, len: 4, continue_at: 0 },
        ],
        Some(0x9000),
    );

    let guest_code = vec![0x11u8; 12];
    let (sb, vge, stats) = bb_to_ir(&cfg, &mut decoder, &guest_code, 0x8000, 0x8000, &ArchInfo, &|_| false);

    assert!(vge.n_used <= 3);
    assert!(stats.n_instrs <= 6);

    let first_five_are_preamble_shaped = matches!(sb.stmts[0], Stmt::Assign { .. })
        && matches!(sb.stmts[1], Stmt::Assign { .. })
        && matches!(sb.stmts[2], Stmt::Put { .. })
        && matches!(sb.stmts[3], Stmt::Put { .. })
        && matches!(sb.stmts[4], Stmt::Exit { .. });
    assert!(first_five_are_preamble_shaped);
    assert!(matches!(sb.stmts[5], Stmt::IMark { .. }));

    let imark_total: u64 = sb
        .stmts
        .iter()
        .filter_map(|s| match s {
            Stmt::IMark { len, .. } => Some(*len as u64),
            _ => None,
        })
        .sum();
    assert_eq!(imark_total, vge.total_len(), "vge lengths must sum to IMark lengths");
}

/// A write-then-branch pattern: a guest `SUB` followed by a conditional
/// branch reads flags straight through the thunk, with no intervening
/// materialization, and the resulting guest state round-trips through
/// `get_cpsr_nzcv`/`put_flags` the same way an interrupt handler saving and
/// restoring CPSR would rely on.
#[test]
fn sub_then_conditional_branch_reads_flags_through_the_thunk_and_back() {
    let mut st = GuestState::initialise();
    st.cc_op = CcOp::Sub as u32;
    st.cc_dep1 = 5;
    st.cc_dep2 = 5;
    st.cc_dep3 = 0;

    let eq = (Condition::Eq as u32) << 4 | CcOp::Sub as u32;
    let ne = (Condition::Ne as u32) << 4 | CcOp::Sub as u32;
    assert_eq!(eval::condition(eq, st.cc_dep1, st.cc_dep2, st.cc_dep3), 1);
    assert_eq!(eval::condition(ne, st.cc_dep1, st.cc_dep2, st.cc_dep3), 0);

    let nzcv = st.get_cpsr_nzcv();
    assert_ne!(nzcv & aero_cpu_core::flags::MASK_Z, 0, "SUB of equal operands sets Z");

    let mut other = GuestState::initialise();
    other.put_flags(nzcv);
    assert_eq!(other.get_cpsr_nzcv(), nzcv);
}
