mod http_transport;

pub use http_transport::{bearer_header, bearer_json_headers, HttpTransport};
