mod progress;
mod range;
mod rms;

pub use progress::{Progress, progress};
pub use range::{ChannelRange, Range};
pub use rms::{Rms, rms};
