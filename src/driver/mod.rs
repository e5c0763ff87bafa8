//! Backend-neutral plumbing: the command IR, global parameter tracking and
//! the command encoder built on top of both.

pub mod encoder;
pub mod ir;
pub mod params;
pub mod state;
