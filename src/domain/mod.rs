//! Embed-origin checks: host matching, origin resolution and the gate that
//! combines them with a chatbot's access policy.

pub mod gate;
pub mod matcher;
pub mod origin;

pub use gate::{evaluate, require_embed_domain, GatePass};
pub use matcher::{extract_host, is_allowed, matches};
pub use origin::resolve_origin;
