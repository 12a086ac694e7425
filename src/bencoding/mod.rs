mod decoder;
mod encoder;
mod value;

pub use decoder::*;
pub use value::*;
