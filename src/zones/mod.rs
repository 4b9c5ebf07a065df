//! Polygon set: ordered zones with identifiers and passthrough attributes.

mod attr;
mod bbox;
mod set;
mod zone_id;

pub use attr::AttrValue;
pub use set::{Zone, ZoneSet};
pub use zone_id::ZoneId;
