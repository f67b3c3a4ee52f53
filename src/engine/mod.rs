pub mod dispatcher;
pub mod locks;
pub mod transitions;

pub use dispatcher::Dispatcher;
