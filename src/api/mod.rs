pub mod http;
pub mod traits;
pub mod types;

pub use http::HttpBackend;
pub use traits::{Backend, ResourceApi};
pub use types::{Ack, Created};
