pub mod constants;
pub mod image;
pub mod runtime;

pub use self::image::decode;
pub use self::runtime::Computer;
