//! Built-in mini-apps. Each owns exactly one task kind and drives it
//! through a controller over the [`crate::handler::TaskHandler`] seam.

pub mod music;
pub mod timer;
