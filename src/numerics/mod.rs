// Numerics: Black-Scholes Greeks and IV solver, IV rank, and 1-minute
// bar indicators. Pure, no I/O, bounded to microseconds per call.

pub mod greeks;
pub mod indicators;
pub mod iv_rank;
