pub mod asset_service;
pub mod locks;
pub mod name_resolver;
pub mod path_guard;
pub mod reaper;
pub mod session_registry;
pub mod store;
pub mod thumbnail;
pub mod upload_service;
