pub mod page;
pub mod session;
