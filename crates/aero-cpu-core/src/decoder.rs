//! The block decoder (spec §4.E): turns a run of guest bytes into one
//! [`ir::SuperBlock`], driven by a caller-supplied [`DisInstrFn`] that knows
//! how to decode one guest instruction at a time. Grounded directly on
//! `bb_to_IR` in `guest-generic/bb_to_IR.c` — the extent bookkeeping,
//! resteer/chase gating, forced termination at `guest_max_insns`, and
//! self-check preamble reservation/back-patch all mirror that function's
//! control flow statement for statement.

use crate::checksum;
use crate::fault::CoreFault;
use crate::ir::{Addr, GuestExtents, IRExpr, JumpKind, Stmt, SuperBlock};
use crate::state::GuestWordType;

/// What the callback wants to happen after decoding one instruction
/// (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhatNext {
    /// Keep decoding the next instruction in sequence.
    Continue,
    /// Stop; the callback has already set [`SuperBlock::next`] and
    /// [`SuperBlock::jumpkind`].
    StopHere,
    /// Chase into `continue_at`: only legal when resteering was offered for
    /// this instruction and `resteer_fn(continue_at)` holds.
    Resteer,
}

/// The callback's per-instruction report (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisResult {
    pub what_next: WhatNext,
    /// Decoded instruction length in bytes, `0..=20`.
    pub len: u32,
    /// Only meaningful when `what_next == Resteer`; must be `0` otherwise.
    pub continue_at: Addr,
}

/// The per-instruction decoding callback (spec §4.E "`dis_instr_fn` contract").
///
/// Implementations decode exactly one guest instruction starting at
/// `guest_code[delta..]`, append whatever IR statements that takes to `sb`
/// (after the [`Stmt::IMark`] the decoder has already appended for them),
/// and report what should happen next. They must update the flag thunk
/// rather than materializing flags directly, and must call `resteer_fn`
/// before returning [`WhatNext::Resteer`] — this trait does not enforce
/// that by construction, [`bb_to_ir`] enforces it by re-checking after the
/// call returns.
///
/// Generic over `A`, the per-ISA architecture-info blob: this crate never
/// looks inside it, only threads it through to the callback unchanged.
pub trait DisInstrFn<A> {
    #[allow(clippy::too_many_arguments)]
    fn decode_one(
        &mut self,
        sb: &mut SuperBlock,
        need_to_put_ip: bool,
        resteer_fn: &dyn Fn(Addr) -> bool,
        guest_code: &[u8],
        delta: u32,
        guest_ip_curr: Addr,
        archinfo_guest: &A,
        host_bigendian: bool,
    ) -> DisResult;
}

/// The validated scalar half of `bb_to_ir`'s entry contract (spec §4.E
/// preconditions). Everything else in the contract (extent overflow,
/// malformed `DisResult`, …) can only be violated by a translator bug and
/// is therefore asserted fatally inside [`bb_to_ir`] itself rather than
/// checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub guest_max_insns: u32,
    pub guest_chase_thresh: u32,
    pub do_self_check: bool,
    pub do_set_nraddr: bool,
    pub guest_word_type: GuestWordType,
    pub host_bigendian: bool,
    pub offb_ti_start: u32,
    pub offb_ti_len: u32,
    pub offb_nraddr: u32,
}

impl DecoderConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guest_max_insns: u32,
        guest_chase_thresh: u32,
        do_self_check: bool,
        do_set_nraddr: bool,
        guest_word_type: GuestWordType,
        host_bigendian: bool,
        offb_ti_start: u32,
        offb_ti_len: u32,
        offb_nraddr: u32,
    ) -> Result<Self, CoreFault> {
        if !(1..=99).contains(&guest_max_insns) {
            return Err(CoreFault::MaxInsnsOutOfRange(guest_max_insns));
        }
        if guest_chase_thresh >= guest_max_insns {
            return Err(CoreFault::ChaseThreshOutOfRange {
                chase: guest_chase_thresh,
                max: guest_max_insns,
            });
        }
        Ok(DecoderConfig {
            guest_max_insns,
            guest_chase_thresh,
            do_self_check,
            do_set_nraddr,
            guest_word_type,
            host_bigendian,
            offb_ti_start,
            offb_ti_len,
            offb_nraddr,
        })
    }
}

/// Replaces the source's file-scope `n_resteers`/`d_resteers` debug
/// counters (spec §9 design notes) with a value `bb_to_ir` hands back
/// directly, so nothing here is global mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStats {
    pub n_instrs: u32,
    pub n_resteers: u32,
}

const NUM_PREAMBLE_STMTS: usize = 5;
/// First temporary index reserved for the self-check preamble's two local
/// assignments. IR temporary allocation is an external collaborator (spec
/// §1 out-of-scope list); this crate does not receive a real allocator, so
/// it reserves a disjoint high range rather than starting from 0 and
/// risking collision with whatever the callback already allocated.
const PREAMBLE_TEMP_BASE: u32 = u32::MAX - 1;

/// `bb_to_ir` (spec §4.E): decode guest instructions starting at
/// `guest_ip_bbstart` until the callback stops, a forced-termination
/// instruction count is hit, or a statically resolved branch is chased
/// into, subject to `guest_chase_thresh` and `chase_into_ok`.
///
/// All failure modes named in the entry contract are translator bugs
/// (spec §7) and abort via [`crate::fault::abort`] rather than returning an
/// error; the only fallible step in the whole pipeline is
/// [`DecoderConfig::new`].
#[allow(clippy::too_many_arguments)]
pub fn bb_to_ir<A>(
    cfg: &DecoderConfig,
    dis_instr_fn: &mut dyn DisInstrFn<A>,
    guest_code: &[u8],
    guest_ip_bbstart: Addr,
    guest_ip_bbstart_noredir: Addr,
    archinfo_guest: &A,
    chase_into_ok: &dyn Fn(Addr) -> bool,
) -> (SuperBlock, GuestExtents, DecodeStats) {
    // Step 1: vge starts with a single extent at the block's first byte.
    let mut vge = GuestExtents::new();
    vge.open(guest_ip_bbstart).unwrap_or_else(|e| crate::fault::abort(e));

    // Step 2.
    let mut sb = SuperBlock::new();

    // Step 3: reserve preamble slots; chasing is disallowed whenever
    // self-checking (enforced below via `resteer_ok`).
    if cfg.do_self_check {
        tracing::trace!(guest_ip_bbstart, "reserving self-check preamble slots");
        for _ in 0..NUM_PREAMBLE_STMTS {
            sb.stmts.push(Stmt::noop());
        }
    }

    // Step 4.
    if cfg.do_set_nraddr {
        sb.stmts.push(Stmt::Put {
            offset: cfg.offb_nraddr,
            value: const_for_word_type(cfg.guest_word_type, guest_ip_bbstart_noredir),
        });
    }

    let mut stats = DecodeStats::default();
    let mut delta: u32 = 0;

    // Step 5: main loop.
    loop {
        let resteer_ok = stats.n_instrs < cfg.guest_chase_thresh
            && !cfg.do_self_check
            && (vge.n_used as usize) < 3;
        let always_false = |_: Addr| false;
        let resteer_fn: &dyn Fn(Addr) -> bool = if resteer_ok { chase_into_ok } else { &always_false };

        let guest_ip_curr = guest_ip_bbstart + delta as u64;
        let imark_index = sb.stmts.len();
        sb.stmts.push(Stmt::IMark {
            addr: guest_ip_curr,
            len: 0,
        });

        let need_to_put_ip = stats.n_instrs > 0;
        let result = dis_instr_fn.decode_one(
            &mut sb,
            need_to_put_ip,
            resteer_fn,
            guest_code,
            delta,
            guest_ip_curr,
            archinfo_guest,
            cfg.host_bigendian,
        );

        if result.len > 20 {
            crate::fault::abort(CoreFault::InstrLenOutOfRange(result.len));
        }
        if result.len == 0 {
            crate::fault::abort(CoreFault::ZeroLengthInstruction);
        }
        if result.what_next != WhatNext::Resteer && result.continue_at != 0 {
            crate::fault::abort(CoreFault::ContinueAtMustBeZero(result.continue_at));
        }

        sb.patch_imark_len(imark_index, result.len);
        vge.grow_current(result.len).unwrap_or_else(|e| crate::fault::abort(e));

        stats.n_instrs += 1;
        delta += result.len;

        match result.what_next {
            WhatNext::Continue => {
                if stats.n_instrs < cfg.guest_max_insns {
                    continue;
                }
                tracing::debug!(
                    guest_ip_bbstart,
                    n_instrs = stats.n_instrs,
                    "forced block termination at guest_max_insns"
                );
                sb.next = Some(const_for_word_type(cfg.guest_word_type, guest_ip_bbstart + delta as u64));
                sb.jumpkind = JumpKind::Boring;
                break;
            }
            WhatNext::StopHere => {
                if sb.next.is_none() {
                    crate::fault::abort(CoreFault::StopHereWithoutNext);
                }
                break;
            }
            WhatNext::Resteer => {
                if !resteer_ok {
                    crate::fault::abort(CoreFault::ResteerNotPermitted(result.continue_at));
                }
                if !resteer_fn(result.continue_at) {
                    crate::fault::abort(CoreFault::ResteerTargetRejected(result.continue_at));
                }
                tracing::trace!(continue_at = result.continue_at, "accepted resteer");
                delta = (result.continue_at - guest_ip_bbstart) as u32;
                vge.open(result.continue_at).unwrap_or_else(|e| crate::fault::abort(e));
                stats.n_resteers += 1;
                continue;
            }
        }
    }

    // Step 6: materialize the self-check preamble in place.
    if cfg.do_self_check {
        let len2check = vge.len[0].max(1);
        let region = &guest_code[..(len2check as usize).min(guest_code.len())];
        let checksum_at_translate_time = checksum::checksum(region);

        tracing::debug!(
            guest_ip_bbstart,
            len2check,
            checksum = checksum_at_translate_time,
            "materializing self-check guard; the Invalidate exit fires if this checksum mismatches at run time"
        );

        let t_start = PREAMBLE_TEMP_BASE;
        let t_len = PREAMBLE_TEMP_BASE + 1;

        sb.stmts[0] = Stmt::Assign {
            temp: t_start,
            value: const_for_word_type(cfg.guest_word_type, guest_ip_bbstart),
        };
        sb.stmts[1] = Stmt::Assign {
            temp: t_len,
            value: IRExpr::const_u32(len2check),
        };
        sb.stmts[2] = Stmt::Put {
            offset: cfg.offb_ti_start,
            value: IRExpr::Temp(t_start),
        };
        sb.stmts[3] = Stmt::Put {
            offset: cfg.offb_ti_len,
            value: IRExpr::Temp(t_len),
        };
        sb.stmts[4] = Stmt::Exit {
            guard: IRExpr::ne32(
                IRExpr::HelperCall {
                    name: "checksum_region",
                    args: vec![IRExpr::Temp(t_start), IRExpr::Temp(t_len)],
                },
                IRExpr::const_u32(checksum_at_translate_time),
            ),
            dst: guest_ip_bbstart,
            jk: JumpKind::Invalidate,
        };
    }

    sb.extents = vge;
    (sb, vge, stats)
}

fn const_for_word_type(word_type: GuestWordType, addr: Addr) -> IRExpr {
    match word_type {
        GuestWordType::Bit32 => IRExpr::const_u32(addr as u32),
        GuestWordType::Bit64 => IRExpr::const_u64(addr),
    }
}
