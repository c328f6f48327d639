mod call;
mod inspect;

pub use call::handle_call;
pub use inspect::handle_inspect;
