pub mod mapper;

pub use mapper::{Mapper, MapperBuilder};
