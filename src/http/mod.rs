pub mod multipart;
pub mod request;
pub mod response;
pub mod server;

pub use multipart::{FilePart, MultipartForm};
pub use request::Request;
pub use response::Response;
pub use server::Server;
