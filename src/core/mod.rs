//! Core implementation: archives, the type registry and the cloud

pub mod archive;
pub mod cache;
pub mod callable;
pub mod cloud;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod objects;
pub mod recordlist;
pub mod registry;
pub mod tensor;
pub mod world;

#[cfg(test)]
mod integration_tests;
