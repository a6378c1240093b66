//! Frame providers

pub mod channel;
pub mod replay;

pub use channel::{ChannelProvider, FrameInjector};
pub use replay::ReplayProvider;
