//! Structured payloads for the translator-bug class of error (spec §7).
//!
//! Every value in here names a condition that can only arise from a bug in
//! the translator itself (an unknown thunk opcode, a malformed decoder
//! callback, a precondition violated by the caller). None of it is
//! recoverable: the core has no partial-block recovery path. [`CoreFault`]
//! exists so those abort sites carry a typed, greppable message instead of
//! an ad hoc `format!`, not so callers can match on and recover from it.
//!
//! [`DecoderConfig::new`](crate::decoder::DecoderConfig::new) is the one
//! legitimate `Result`-returning entry point in this crate; it returns
//! `CoreFault` too, so there is exactly one error vocabulary.

use thiserror::Error;

/// A translator-bug-class fault: fatal by construction, never recovered from.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreFault {
    #[error("unknown cc_op {0}")]
    UnknownCcOp(u32),

    #[error("forbidden condition code {0} (AL/NV never reach the evaluator)")]
    ForbiddenCondition(u32),

    #[error("guest_max_insns {0} out of range [1, 99]")]
    MaxInsnsOutOfRange(u32),

    #[error("guest_chase_thresh {chase} out of range [0, guest_max_insns={max})")]
    ChaseThreshOutOfRange { chase: u32, max: u32 },

    #[error("decoded instruction length {0} out of range [0, 20]")]
    InstrLenOutOfRange(u32),

    #[error("decoder callback returned a zero-length instruction")]
    ZeroLengthInstruction,

    #[error("Resteer returned with continue_at={0} but resteering was not permitted here")]
    ResteerNotPermitted(u64),

    #[error("resteer_fn rejected its own continue_at=0x{0:x}")]
    ResteerTargetRejected(u64),

    #[error("Dis_StopHere returned without setting SuperBlock::next")]
    StopHereWithoutNext,

    #[error("continue_at must be 0 unless what_next == Resteer (got {0})")]
    ContinueAtMustBeZero(u64),

    #[error("guest extents overflowed 3 slots")]
    ExtentOverflow,

    #[error("extent length grew past the 5000-byte sanity bound")]
    ExtentTooLong,
}

/// Aborts the translator with `fault`'s message, the way `vpanic` does in the
/// source this crate is grounded on. Fatal errors never unwind past here.
#[track_caller]
pub fn abort(fault: CoreFault) -> ! {
    panic!("aero-cpu-core: translator bug: {fault}");
}
