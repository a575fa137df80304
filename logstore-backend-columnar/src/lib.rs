pub mod columnar_driver;

pub use columnar_driver::ColumnarDriver;
