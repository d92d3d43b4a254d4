pub mod arbiter;
pub mod ooo_mux;
pub mod rob;
pub mod router;
pub mod top;

pub use arbiter::{ArbMode, Arbiter, ArbiterConfig, BranchSel};
pub use ooo_mux::{OooMux, OooMuxConfig};
pub use rob::{ReorderBuffer, RobConfig};
pub use router::{BankRouter, WideRequest, WideResponse};
pub use top::{FabricConfig, FabricStats, HwpePort, TcdmFabric};
