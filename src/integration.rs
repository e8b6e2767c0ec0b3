pub mod factory;

pub use factory::{host_and_port, ProbeFactory, ProbeFactoryError};
