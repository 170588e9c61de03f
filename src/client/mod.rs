pub mod channel;
pub mod stream;

pub use channel::RequestChannel;
pub use stream::{SessionState, SessionStream};
