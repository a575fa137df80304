pub mod memory_driver;

pub use memory_driver::InMemoryDriver;
