//! Front end for CGI scripts: runs the script, splits its output and points
//! every link in HTML responses back at the proxying entry point.

pub mod cgi;
pub mod config;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod http;
pub mod options;
pub mod proxy_url;
pub mod render;
pub mod response;
pub mod rewrite;
pub mod router;
pub mod server;

pub use error::GatewayError;
pub use gateway::Gateway;
pub use options::{Options, RequestContext};
