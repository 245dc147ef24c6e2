mod data;
mod id;
mod map;

pub use data::Arena;
pub use id::{Id, Identifier};
pub use map::IdMap;
