mod endpoint;
mod member;
mod options;
mod settings;
mod status;

pub use endpoint::*;
pub use member::*;
pub use options::*;
pub use settings::*;
pub use status::*;
