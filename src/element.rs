//! Structural elements that assemble the system matrices the integrators
//! consume.

pub mod beam;
