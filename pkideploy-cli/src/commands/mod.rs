pub mod destroy;
pub mod spawn;
