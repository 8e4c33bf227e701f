pub mod backend;
pub mod credentials;
pub mod http;

pub use backend::MeetingBackend;
pub use http::HttpBackend;
