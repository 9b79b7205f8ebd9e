// Signal generators: three pure functions, one per strategy. None
// touch the broker, the store, or a global clock.

pub mod iron_condor;
pub mod iv_mean_reversion;
pub mod momentum_scalping;
