//! Routing tree maintenance
//!
//! Every node keeps the edges of the subtree below it. Changes to that subtree
//! are flagged and reported to the parent; a change is only finalized once the
//! parent has acknowledged the report, which makes the propagation towards the
//! hub eventually consistent.

pub mod edge;
pub mod table;
pub mod update;

pub use self::edge::{Edge, EdgeFlags};
pub use self::table::RouteTable;
pub use self::update::{RoutingUpdate, DROP_LEN, JOIN_LEN};
