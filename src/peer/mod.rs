mod assembler;
mod blocks;
mod dispatch;
mod session;

pub use dispatch::ChokeState;
pub use session::PeerSession;
