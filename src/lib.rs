//! Building blocks for Kubernetes controllers: condition accessors, an
//! in-memory client for tests, object-set helpers, and wrappers around
//! `kustomize` and the `go` tool.
pub mod client;
pub mod conditions;
pub mod config;
pub mod errors;
pub mod fieldindexer;
pub mod kustomize;
pub mod labels;
pub mod memorystore;
pub mod meta;
pub mod scheme;
pub mod switches;
pub mod toolchain;
pub mod unstructured;
