//! The lowering passes. The conventional pipeline is inline →
//! normalize-delays → synthesize-channels → reduce-structures → dce.
mod dead_code_elimination;
mod inline_invokes;
mod normalize_delays;
mod reduce_structures;
mod synthesize_channels;

pub use dead_code_elimination::DeadCodeElimination;
pub use inline_invokes::InlineInvokes;
pub use normalize_delays::NormalizeDelays;
pub use reduce_structures::ReduceStructures;
pub use synthesize_channels::SynthesizeChannels;
