pub mod consts;
pub mod error;
pub mod external;
pub mod frame;
pub mod naming;
pub mod pipeline;
pub mod session;
pub mod stages;
pub mod store;
pub mod target;
pub mod trace;
