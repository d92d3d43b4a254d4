pub mod base;
pub mod ecc;
pub mod interco;
pub mod mem;
pub mod protocol;
pub mod sim;
pub mod traffic;
