pub mod management;

pub use management::ManagementServer;
