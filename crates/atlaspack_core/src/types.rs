pub use self::asset::*;
pub use self::build_mode::*;
pub use self::bundle::*;
pub use self::dependency::*;
pub use self::diagnostic::*;
pub use self::environment::*;
pub use self::feature_flags::*;
pub use self::file_type::*;
pub use self::target::*;

mod asset;
mod build_mode;
mod bundle;
mod dependency;
mod diagnostic;
mod environment;
mod feature_flags;
mod file_type;
mod target;
