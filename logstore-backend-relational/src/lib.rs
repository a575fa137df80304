pub mod relational_driver;

pub use relational_driver::PostgresDriver;
