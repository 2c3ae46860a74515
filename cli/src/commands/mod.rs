pub mod health;
pub mod keygen;
pub mod rpc;
pub mod stream;
