pub mod codec;
pub mod manager;
pub mod secded;

pub use codec::{
    EccConfig, FaultInjectConfig, FaultInjector, RequestCodec, RequestDecode, ResponseCodec,
    ResponseDecode,
};
pub use manager::{EccCounters, EccManager, FaultFlags, PeriphRequest, PeriphResponse};
pub use secded::{SecdedCode, SecdedDecode};
