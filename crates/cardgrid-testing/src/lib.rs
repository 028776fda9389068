//! Testing utilities and harness for Cardgrid

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::*;

pub mod prelude {
    pub use crate::fakes::*;
    pub use crate::harness::*;
    pub use cardgrid_foundation::prelude::*;
}
