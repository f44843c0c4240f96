//! The Streamable HTTP encoding: a single endpoint multiplexing POST
//! (request/response), GET (server push), and DELETE (session teardown).

pub mod client;
pub mod server;
