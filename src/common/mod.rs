pub mod error;
pub use error::RsqlError;

pub mod result;
pub use result::RsqlResult;

pub mod bytes;

pub mod value;
pub use value::Value;
