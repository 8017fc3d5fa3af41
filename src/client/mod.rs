pub mod builder;
mod chat;
mod model;
pub mod transport;

pub use builder::{DEFAULT_BASE_URL, DEFAULT_MODEL, GenerativeModelBuilder};
pub use chat::ChatSession;
pub use model::{GenerativeModel, ResponseStream};
pub use transport::{
    ApiError, HttpMethod, ReqwestTransport, Transport, TransportRequest, TransportResponse,
};
