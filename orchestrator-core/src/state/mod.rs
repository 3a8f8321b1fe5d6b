//! StateModel (C11): closed enumerations, rational helpers, HDR primary
//! templates, color tag tables, and the track/mission data types shared by
//! every other component. Everything here is pure data plus pure functions,
//! per spec §4.11.

pub mod enums;
pub mod mission;
pub mod rational;
pub mod track;

pub use enums::*;
pub use mission::*;
pub use rational::Rational;
pub use track::*;
