pub mod fetch;
pub mod files;
pub mod queue;
pub mod serve;
pub mod util;

pub use fetch::fetch;
pub use files::files;
pub use queue::queue;
pub use serve::serve;
pub use util::{load_settings, Overrides};
