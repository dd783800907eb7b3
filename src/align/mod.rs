pub mod diff;
pub mod edit_script;
pub mod extend;
pub mod halign;
pub mod local;
pub mod okn;
pub mod overlap;

pub use diff::{diff, script_cost, DiffParams};
pub use edit_script::{EditKind, EditOp, EditScript};
pub use extend::{Extender, Extension};
pub use halign::{halign, halign_start, Halignment, Segment};
pub use local::{local_trace, LocalOverlap, LocalParams, LocalSegment, LocalTrace};
pub use okn::{okn_align, OknTrace};
pub use overlap::{overlap_align, BestResult, OverlapKind, OverlapParams, OverlapRegion};
