pub mod http;
pub mod sse_buffer;
