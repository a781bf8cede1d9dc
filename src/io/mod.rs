//! Messages, codecs and file I/O.
//!
//! The transport itself (topics, services, timers) is external; this module
//! only defines the serde message payloads, the layer ↔ message codec and
//! the on-disk formats for maps, trajectories and meshes.

pub mod codec;
pub mod layer_file;
pub mod messages;
pub mod path;
pub mod ply;
pub mod trajectory;
pub mod viz;
