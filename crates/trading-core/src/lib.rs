pub mod error;
pub mod percent;
pub mod range;
pub mod tick;
pub mod timeframe;
pub mod volume;

pub use error::*;
pub use percent::*;
pub use range::*;
pub use tick::*;
pub use timeframe::*;
pub use volume::*;
