//! Registry services. `registry_service` owns shared state and persistence;
//! the other modules add push admission and the container lifecycle as
//! further `impl RegistryService` blocks.

pub mod container_service;
pub mod push_service;
pub mod registry_service;
