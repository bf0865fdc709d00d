//! Contact-mechanics model implementations.
//!
//! Models are implemented as small, pure functions so that fitting code can stay
//! generic over the closed `ContactModel` set.

pub mod model;

pub use model::*;
