pub mod fetcher;
pub mod forward;
pub mod handler;
pub mod redirect;
