pub mod error;
pub mod model;
pub mod network;
pub mod preprocess;
pub mod server;
pub mod utils;
