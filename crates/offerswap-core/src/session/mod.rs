//! Session lifecycle: status transitions and the cache-backed session store.

mod state;
mod store;

pub use store::SessionStore;
