pub mod classify;
pub mod config;
pub mod docx;
pub mod error;
pub mod ir;
pub mod models;
pub mod pipeline;
pub mod reconcile;
pub mod server;
pub mod textutil;

#[cfg(test)]
pub(crate) mod testutil;
