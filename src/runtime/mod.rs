pub mod ai_state;
pub mod alert;
pub mod builtins;
pub mod director;
pub mod runtime_error;
pub mod sandbox;
pub mod vm;
pub mod world;

pub use director::{Director, TickReport};
pub use vm::{TickOutcome, Vm, VmConfig};
pub use world::{EntityRef, WorldAccess};
