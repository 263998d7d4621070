mod buffer;
mod sample;

pub use buffer::{SampleBuffer, LIVE_WINDOW, TABLE_ROWS};
pub use sample::{Sample, SessionId};
