pub mod api;
pub mod data;
pub mod session;
pub mod sync;
pub mod util;

pub use data::{Sample, SampleBuffer, SessionId};
pub use session::{DataScreen, EntryScreen, SessionKey};
